use std::time::Duration;

use deepsearch_core::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://yunwu.ai";
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_TIMEOUT_SECS: f64 = 30.0;

/// Alias groups, in priority order: the first set, non-blank variable wins.
pub const API_KEY_ENV_VARS: [&str; 3] = ["DEEPSEARCH_API_KEY", "API_KEY", "DEEPSEARCH_TOKEN"];
pub const BASE_URL_ENV_VARS: [&str; 2] = ["DEEPSEARCH_BASE_URL", "BASE_URL"];
pub const MODEL_ENV_VARS: [&str; 3] = ["DEEPSEARCH_MODEL", "MODEL_NAME", "MODEL"];
pub const TIMEOUT_ENV_VARS: [&str; 2] = ["DEEPSEARCH_TIMEOUT", "TIMEOUT"];

/// First alias that is set to a non-blank value, or None. Blank values are
/// skipped, not treated as present-but-invalid.
pub fn matched_var(names: &[&'static str]) -> Option<&'static str> {
    names
        .iter()
        .find(|name| {
            std::env::var(name)
                .ok()
                .is_some_and(|v| !v.trim().is_empty())
        })
        .copied()
}

fn first_env(names: &[&'static str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

/// Everything the transport needs to reach the upstream chat-completions
/// endpoint. Resolved once; immutable afterwards.
#[derive(Debug, Clone)]
pub struct DeepSearchConfig {
    pub api_key: String,
    /// Normalized to `scheme://host[:port]`, no path, no trailing slash.
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl DeepSearchConfig {
    pub fn from_env() -> Result<Self> {
        let api_key = first_env(&API_KEY_ENV_VARS).ok_or_else(|| {
            Error::NotConfigured(
                "missing DEEPSEARCH_API_KEY (or API_KEY / DEEPSEARCH_TOKEN)".to_string(),
            )
        })?;

        let base_url_raw =
            first_env(&BASE_URL_ENV_VARS).unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = normalize_base_url(&base_url_raw)?;

        let model = first_env(&MODEL_ENV_VARS).unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let timeout = match first_env(&TIMEOUT_ENV_VARS) {
            Some(raw) => parse_timeout_secs(&raw)?,
            None => Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS),
        };

        Ok(Self {
            api_key,
            base_url,
            model,
            timeout,
        })
    }
}

/// Reduce a URL to `scheme://host[:port]` so request URLs can be built by
/// plain path concatenation (no inherited paths, no double slashes).
pub fn normalize_base_url(raw: &str) -> Result<String> {
    let parsed = url::Url::parse(raw.trim())
        .map_err(|_| Error::NotConfigured(format!("invalid base url: {raw:?}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| Error::NotConfigured(format!("base url must carry a host: {raw:?}")))?;
    let mut base = format!("{}://{}", parsed.scheme(), host);
    if let Some(port) = parsed.port() {
        base.push(':');
        base.push_str(&port.to_string());
    }
    Ok(base)
}

fn parse_timeout_secs(raw: &str) -> Result<Duration> {
    let secs: f64 = raw
        .parse()
        .map_err(|_| Error::NotConfigured(format!("timeout must be a number, got {raw:?}")))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(Error::NotConfigured(format!(
            "timeout must be a non-negative number, got {raw:?}"
        )));
    }
    Ok(Duration::from_secs_f64(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env vars are process-global; serialize tests that mutate them.
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    const ALL_ENV_KEYS: [&str; 10] = [
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
    ];

    struct EnvGuard {
        // Hold the lock for the full test.
        _lock: std::sync::MutexGuard<'static, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(keys: &[&str]) -> Self {
            // Recover from a poisoned lock so one panicking test doesn't
            // cascade (env state is restored on drop either way).
            let lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
            let saved: Vec<(String, Option<String>)> = keys
                .iter()
                .map(|k| (k.to_string(), std::env::var(k).ok()))
                .collect();
            for (k, _) in &saved {
                std::env::remove_var(k);
            }
            Self { _lock: lock, saved }
        }

        fn set(&self, k: &str, v: &str) {
            std::env::set_var(k, v);
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (k, v) in self.saved.drain(..) {
                match v {
                    Some(val) => std::env::set_var(&k, val),
                    None => std::env::remove_var(&k),
                }
            }
        }
    }

    #[test]
    fn missing_credential_is_a_config_error() {
        let _env = EnvGuard::new(&ALL_ENV_KEYS);
        let err = DeepSearchConfig::from_env().unwrap_err();
        assert!(matches!(err, Error::NotConfigured(_)), "got {err:?}");
    }

    #[test]
    fn credential_alias_priority_is_first_match_wins() {
        let env = EnvGuard::new(&ALL_ENV_KEYS);
        env.set("DEEPSEARCH_TOKEN", "low");
        env.set("API_KEY", "mid");
        env.set("DEEPSEARCH_API_KEY", "high");
        let cfg = DeepSearchConfig::from_env().expect("config");
        assert_eq!(cfg.api_key, "high");
        assert_eq!(matched_var(&API_KEY_ENV_VARS), Some("DEEPSEARCH_API_KEY"));
    }

    #[test]
    fn blank_credential_alias_is_skipped() {
        let env = EnvGuard::new(&ALL_ENV_KEYS);
        env.set("DEEPSEARCH_API_KEY", "   ");
        env.set("API_KEY", "fallback");
        let cfg = DeepSearchConfig::from_env().expect("config");
        assert_eq!(cfg.api_key, "fallback");
    }

    #[test]
    fn defaults_apply_when_only_credential_is_set() {
        let env = EnvGuard::new(&ALL_ENV_KEYS);
        env.set("DEEPSEARCH_API_KEY", "k");
        let cfg = DeepSearchConfig::from_env().expect("config");
        assert_eq!(cfg.base_url, "https://yunwu.ai");
        assert_eq!(cfg.model, "gemini-2.5-pro");
        assert_eq!(cfg.timeout, Duration::from_secs_f64(30.0));
    }

    #[test]
    fn base_url_path_and_query_are_discarded() {
        let env = EnvGuard::new(&ALL_ENV_KEYS);
        env.set("DEEPSEARCH_API_KEY", "k");
        env.set("BASE_URL", "https://example.com/v1/chat/completions?x=1#frag");
        let cfg = DeepSearchConfig::from_env().expect("config");
        assert_eq!(cfg.base_url, "https://example.com");
    }

    #[test]
    fn base_url_port_survives_normalization() {
        assert_eq!(
            normalize_base_url("http://127.0.0.1:8080/api/").expect("normalize"),
            "http://127.0.0.1:8080"
        );
    }

    #[test]
    fn base_url_trailing_slash_is_stripped() {
        assert_eq!(
            normalize_base_url("https://example.com/").expect("normalize"),
            "https://example.com"
        );
    }

    #[test]
    fn base_url_without_scheme_is_rejected() {
        let err = normalize_base_url("example.com/v1").unwrap_err();
        assert!(matches!(err, Error::NotConfigured(_)), "got {err:?}");
    }

    #[test]
    fn base_url_without_host_is_rejected() {
        let err = normalize_base_url("file:///tmp/x").unwrap_err();
        assert!(matches!(err, Error::NotConfigured(_)), "got {err:?}");
    }

    #[test]
    fn timeout_accepts_fractional_seconds() {
        let env = EnvGuard::new(&ALL_ENV_KEYS);
        env.set("DEEPSEARCH_API_KEY", "k");
        env.set("TIMEOUT", "2.5");
        let cfg = DeepSearchConfig::from_env().expect("config");
        assert_eq!(cfg.timeout, Duration::from_secs_f64(2.5));
    }

    #[test]
    fn timeout_alias_priority_prefers_prefixed_name() {
        let env = EnvGuard::new(&ALL_ENV_KEYS);
        env.set("DEEPSEARCH_API_KEY", "k");
        env.set("TIMEOUT", "5");
        env.set("DEEPSEARCH_TIMEOUT", "10");
        let cfg = DeepSearchConfig::from_env().expect("config");
        assert_eq!(cfg.timeout, Duration::from_secs_f64(10.0));
    }

    #[test]
    fn non_numeric_timeout_is_a_config_error() {
        let env = EnvGuard::new(&ALL_ENV_KEYS);
        env.set("DEEPSEARCH_API_KEY", "k");
        env.set("DEEPSEARCH_TIMEOUT", "soon");
        let err = DeepSearchConfig::from_env().unwrap_err();
        assert!(matches!(err, Error::NotConfigured(_)), "got {err:?}");
    }

    #[test]
    fn negative_timeout_is_a_config_error() {
        let env = EnvGuard::new(&ALL_ENV_KEYS);
        env.set("DEEPSEARCH_API_KEY", "k");
        env.set("DEEPSEARCH_TIMEOUT", "-1");
        let err = DeepSearchConfig::from_env().unwrap_err();
        assert!(matches!(err, Error::NotConfigured(_)), "got {err:?}");
    }

    proptest::proptest! {
        #[test]
        fn normalization_drops_any_appended_path(path in "[a-z0-9]{0,8}(/[a-z0-9]{1,8}){0,4}") {
            let url = format!("https://example.com/{path}");
            proptest::prop_assert_eq!(
                normalize_base_url(&url).expect("normalize"),
                "https://example.com"
            );
        }
    }
}
