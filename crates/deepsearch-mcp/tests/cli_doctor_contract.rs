use assert_cmd::Command;
use serde_json::Value;

const ENV_KEYS: [&str; 11] = [
    "DEEPSEARCH_API_KEY",
    "API_KEY",
    "DEEPSEARCH_TOKEN",
    "DEEPSEARCH_BASE_URL",
    "BASE_URL",
    "DEEPSEARCH_MODEL",
    "MODEL_NAME",
    "MODEL",
    "DEEPSEARCH_TIMEOUT",
    "TIMEOUT",
    "DEEPSEARCH_ENV_FILE",
];

fn doctor_cmd() -> Command {
    let mut cmd = Command::cargo_bin("deepsearch-mcp").expect("binary");
    for key in ENV_KEYS {
        cmd.env_remove(key);
    }
    cmd.arg("doctor");
    cmd
}

#[test]
fn doctor_reports_missing_credentials() {
    let out = doctor_cmd().output().expect("run doctor");
    assert!(out.status.success());
    let v: Value = serde_json::from_slice(&out.stdout).expect("doctor json");
    assert_eq!(v["ok"], false);
    assert!(v["error"]
        .as_str()
        .unwrap_or_default()
        .contains("DEEPSEARCH_API_KEY"));
}

#[test]
fn doctor_reports_normalized_config_without_secrets() {
    let out = doctor_cmd()
        .env("DEEPSEARCH_API_KEY", "secret-credential-value")
        .env("BASE_URL", "https://example.com/v1/chat/completions")
        .output()
        .expect("run doctor");
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    let v: Value = serde_json::from_str(&stdout).expect("doctor json");
    assert_eq!(v["ok"], true);
    assert_eq!(v["credential_var"], "DEEPSEARCH_API_KEY");
    assert_eq!(v["base_url"], "https://example.com");
    assert_eq!(v["model"], "gemini-2.5-pro");
    assert!(!stdout.contains("secret-credential-value"));
}

#[test]
fn version_prints_the_package_version() {
    let mut cmd = Command::cargo_bin("deepsearch-mcp").expect("binary");
    let out = cmd.arg("version").output().expect("run version");
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.starts_with("deepsearch-mcp "));
}
