use secrecy::SecretString;

use crate::{Config, error::ConfigError};

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_SERVICE_NAME: &str = "llm-openai-proxy";
const DEFAULT_SERVICE_VERSION: &str = "v1";
const DEFAULT_MODEL: &str = "custom-llm";
const DEFAULT_LOG_FILTER: &str = "info";

/// Assemble a [`Config`] from the process environment.
///
/// Every field has a default so a bare `llm-openai-proxy` with no
/// environment set at all starts in echo mode, listening on port 3000.
pub fn load() -> Result<Config, ConfigError> {
    load_from(|key| std::env::var(key).ok())
}

/// Same as [`load`], but reads from an arbitrary lookup function instead of
/// the real process environment. Used by tests so they don't race on global
/// environment state.
pub fn load_from(get: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
    let port = match get("PORT") {
        Some(value) => value
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort(value.clone()))?,
        None => DEFAULT_PORT,
    };

    let service_name = get("SERVICE_NAME").unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());
    let service_version = get("SERVICE_VERSION").unwrap_or_else(|| DEFAULT_SERVICE_VERSION.to_string());

    let models = match get("MODELS") {
        Some(value) => {
            let models: Vec<String> = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();

            if models.is_empty() {
                return Err(ConfigError::EmptyModelList);
            }

            models
        }
        None => vec![DEFAULT_MODEL.to_string()],
    };

    // An empty CUSTOM_LLM_URL is treated the same as an unset one: echo mode.
    let custom_llm_url = get("CUSTOM_LLM_URL").filter(|value| !value.is_empty());
    let custom_llm_key = get("CUSTOM_LLM_KEY")
        .filter(|value| !value.is_empty())
        .map(SecretString::from);
    let proxy_key = get("PROXY_KEY")
        .filter(|value| !value.is_empty())
        .map(SecretString::from);

    let log_filter = get("LOG_FILTER").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    Ok(Config {
        port,
        service_name,
        service_version,
        models,
        custom_llm_url,
        custom_llm_key,
        proxy_key,
        log_filter,
    })
}
