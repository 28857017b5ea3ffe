//! Engine endpoint addressing.
//!
//! Operators configure a single base URL (`http://host:8188`); the
//! WebSocket URL is derived from it by swapping the scheme.

use serde::Serialize;

/// HTTP and WebSocket base URLs of one ComfyUI server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineEndpoint {
    /// HTTP base URL, e.g. `http://host:8188`.
    pub url: String,
    /// WebSocket base URL, e.g. `ws://host:8188`.
    pub ws_url: String,
}

/// Errors from [`EngineEndpoint::parse`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("Invalid engine URL: {0}")]
    Invalid(String),

    #[error("Unsupported URL scheme '{0}', expected http or https")]
    UnsupportedScheme(String),

    #[error("Engine URL has no host")]
    MissingHost,
}

impl EngineEndpoint {
    /// Parse an operator-supplied base URL.
    ///
    /// A bare `host:port` is treated as `http://host:port`. Trailing
    /// slashes are dropped so paths can be appended with `format!`.
    pub fn parse(raw: &str) -> Result<Self, EndpointError> {
        let trimmed = raw.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(EndpointError::Invalid("empty URL".into()));
        }

        let normalized = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        };

        let parsed =
            reqwest::Url::parse(&normalized).map_err(|e| EndpointError::Invalid(e.to_string()))?;

        let ws_scheme = match parsed.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
        };

        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(EndpointError::MissingHost);
        }
        // Request paths are appended to the base; a query or fragment would swallow them.
        if parsed.query().is_some() || parsed.fragment().is_some() {
            return Err(EndpointError::Invalid(
                "base URL must not carry a query or fragment".into(),
            ));
        }

        let rest = &normalized[parsed.scheme().len()..];
        Ok(Self {
            ws_url: format!("{ws_scheme}{rest}"),
            url: normalized,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_maps_to_ws() {
        let ep = EngineEndpoint::parse("http://127.0.0.1:8188/").unwrap();
        assert_eq!(ep.url, "http://127.0.0.1:8188");
        assert_eq!(ep.ws_url, "ws://127.0.0.1:8188");
    }

    #[test]
    fn https_maps_to_wss_and_keeps_path() {
        let ep = EngineEndpoint::parse("https://gpu.example.com/comfy").unwrap();
        assert_eq!(ep.ws_url, "wss://gpu.example.com/comfy");
    }

    #[test]
    fn bare_host_defaults_to_http() {
        let ep = EngineEndpoint::parse("10.0.0.5:8188").unwrap();
        assert_eq!(ep.url, "http://10.0.0.5:8188");
        assert_eq!(ep.ws_url, "ws://10.0.0.5:8188");
    }

    #[test]
    fn rejects_other_schemes() {
        assert_eq!(
            EngineEndpoint::parse("ftp://host").unwrap_err(),
            EndpointError::UnsupportedScheme("ftp".into())
        );
    }

    #[test]
    fn rejects_query_and_fragment() {
        for raw in ["http://h:8188?x", "http://h:8188/?token=1", "http://h:8188#top"] {
            assert!(
                matches!(EngineEndpoint::parse(raw), Err(EndpointError::Invalid(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_empty() {
        assert!(EngineEndpoint::parse("   ").is_err());
    }
}
