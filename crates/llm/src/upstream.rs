//! Deriving the upstream endpoint and auth headers, and the shared HTTP
//! client used to reach it.

use std::{sync::OnceLock, time::Duration};

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};

const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
const MODELS_PATH: &str = "/v1/models";

/// Process-wide HTTP client, built once and reused for every request.
///
/// Sets **no** blanket request timeout: upstream idle periods of several
/// minutes are expected from slow "thinking" models, so the proxy relies on
/// the transport staying open rather than an artificial deadline. Connection
/// reuse still comes from `pool_idle_timeout` and TCP keepalive.
pub fn http_client() -> Client {
    static CLIENT: OnceLock<Client> = OnceLock::new();

    CLIENT
        .get_or_init(|| {
            Client::builder()
                .pool_idle_timeout(Some(Duration::from_secs(90)))
                .tcp_nodelay(true)
                .tcp_keepalive(Some(Duration::from_secs(60)))
                .build()
                .expect("failed to build default HTTP client")
        })
        .clone()
}

/// Where (and whether) to send upstream requests.
///
/// A missing or unparseable `base_url` means **echo mode**: `Upstream::Echo`
/// carries no client and no endpoint, and the engine must never attempt
/// upstream I/O when it holds this variant.
#[derive(Clone)]
pub enum Upstream {
    Echo,
    Configured {
        client: Client,
        chat_completions_url: String,
        models_url: String,
        api_key: Option<SecretString>,
    },
}

impl Upstream {
    /// Build an `Upstream` from the configured base URL and key. `base_url`
    /// being `None` or empty is echo mode.
    pub fn new(base_url: Option<&str>, api_key: Option<SecretString>) -> Self {
        let Some(base_url) = base_url.filter(|s| !s.is_empty()) else {
            return Upstream::Echo;
        };

        Upstream::Configured {
            client: http_client(),
            chat_completions_url: derive_endpoint(base_url, CHAT_COMPLETIONS_PATH),
            models_url: derive_endpoint(base_url, MODELS_PATH),
            api_key,
        }
    }

    pub fn is_echo(&self) -> bool {
        matches!(self, Upstream::Echo)
    }

    /// Headers to send with every upstream request: `content-type` always,
    /// `authorization: Bearer <key>` only when a non-empty key is configured.
    pub fn auth_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![("content-type", "application/json".to_string())];

        if let Upstream::Configured { api_key: Some(key), .. } = self
            && !key.expose_secret().is_empty()
        {
            headers.push(("authorization", format!("Bearer {}", key.expose_secret())));
        }

        headers
    }
}

/// Derive the upstream endpoint for `pathname` from a configured base URL.
///
/// If `base_url` parses as a URL with a non-trivial path (anything beyond
/// `/`) and `pathname` is the Chat Completions path, `base_url` is assumed
/// to already be a full endpoint and is used unchanged. Otherwise the
/// result is `origin(base_url) + pathname`.
fn derive_endpoint(base_url: &str, pathname: &str) -> String {
    let Ok(parsed) = reqwest::Url::parse(base_url) else {
        // Not parseable as an absolute URL — treat it as already-complete
        // (e.g. a bare host:port the caller composed themselves).
        return base_url.trim_end_matches('/').to_string() + pathname;
    };

    let has_nontrivial_path = parsed.path() != "" && parsed.path() != "/";

    if has_nontrivial_path && pathname == CHAT_COMPLETIONS_PATH {
        return base_url.to_string();
    }

    format!("{}{pathname}", parsed.origin().ascii_serialization())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_origin_gets_pathname_appended() {
        assert_eq!(
            derive_endpoint("https://example.com", CHAT_COMPLETIONS_PATH),
            "https://example.com/v1/chat/completions"
        );
    }

    #[test]
    fn full_endpoint_with_path_is_used_unchanged_for_chat_completions() {
        assert_eq!(
            derive_endpoint("https://example.com/custom/v2/chat", CHAT_COMPLETIONS_PATH),
            "https://example.com/custom/v2/chat"
        );
    }

    #[test]
    fn full_endpoint_with_path_still_swaps_in_models_pathname() {
        assert_eq!(
            derive_endpoint("https://example.com/custom/v2/chat", MODELS_PATH),
            "https://example.com/v1/models"
        );
    }

    #[test]
    fn missing_base_url_is_echo_mode() {
        assert!(Upstream::new(None, None).is_echo());
        assert!(Upstream::new(Some(""), None).is_echo());
    }

    #[test]
    fn auth_headers_include_bearer_only_when_key_present() {
        let upstream = Upstream::new(Some("https://example.com"), Some(SecretString::from("sk-test".to_string())));
        let headers = upstream.auth_headers();

        assert!(headers.contains(&("content-type", "application/json".to_string())));
        assert!(headers.contains(&("authorization", "Bearer sk-test".to_string())));
    }

    #[test]
    fn auth_headers_omit_bearer_when_no_key() {
        let upstream = Upstream::new(Some("https://example.com"), None);
        let headers = upstream.auth_headers();

        assert_eq!(headers, vec![("content-type", "application/json".to_string())]);
    }
}
