//! Remote implementation of the deepsearch toolchain: environment-driven
//! configuration, the chat-completions transport, the normalizing client,
//! and the two search agents.

pub mod agents;
pub mod client;
pub mod config;
pub mod transport;

pub use agents::{DeepSearchAgent, DeepSearchWebAgent};
pub use client::DeepSearchClient;
pub use config::DeepSearchConfig;
pub use transport::DeepSearchTransport;
