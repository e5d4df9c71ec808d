//! Process configuration for the LLM proxy.
//!
//! Everything is read once from the environment at startup (see
//! [`loader::load`]) and shared read-only for the lifetime of the process —
//! there is no hot reload and no mutable shared state.

mod error;
mod loader;

use secrecy::SecretString;

pub use error::ConfigError;
pub use loader::load;

/// Resolved configuration for a running proxy instance.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port to listen on. `PORT`, default `3000`.
    pub port: u16,
    /// Name reported in `/`, `/v1`, `/health`, and as `owned_by` in echo-mode
    /// model listings. `SERVICE_NAME`, default `"llm-openai-proxy"`.
    pub service_name: String,
    /// Version string reported in `/` and `/v1`. `SERVICE_VERSION`, default `"v1"`.
    pub service_version: String,
    /// Models advertised by `/v1/models` when no upstream is configured.
    /// `MODELS`, comma-separated, default `["custom-llm"]`.
    pub models: Vec<String>,
    /// Base URL of the upstream Chat Completions API. `CUSTOM_LLM_URL`.
    /// Absent or empty means echo mode: no upstream I/O is performed.
    pub custom_llm_url: Option<String>,
    /// Bearer token sent to the upstream, if any. `CUSTOM_LLM_KEY`.
    pub custom_llm_key: Option<SecretString>,
    /// Shared secret callers must present to use the proxy. `PROXY_KEY`.
    /// When unset, the proxy is unauthenticated.
    pub proxy_key: Option<SecretString>,
    /// Log filter string passed to the logger (e.g. `"info"`, `"llm=debug"`).
    /// `LOG_FILTER`, default `"info"`.
    pub log_filter: String,
}

impl Config {
    /// Whether a real upstream is configured. When `false`, the proxy runs
    /// in echo mode and never performs upstream I/O.
    pub fn has_upstream(&self) -> bool {
        self.custom_llm_url.is_some()
    }
}
