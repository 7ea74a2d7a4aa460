//! Single-envelope JSON-RPC transport
//!
//! One call is one HTTP POST. No retry, no session renewal; those live in
//! the layers above.

use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::Client;
use tracing::{debug, instrument, Level};
use url::Url;

use crate::config::ClientSettings;
use crate::error::{FmgError, Result};
use crate::protocol::{parse_response, Method, RequestEnvelope, ResponseEnvelope, StatusTable, Target};
use crate::sanitize;
use crate::session::AuthMaterial;

/// HTTPS transport for the `/jsonrpc` endpoint
#[derive(Debug)]
pub struct RpcTransport {
    client: Client,
    endpoint: Url,
    statuses: StatusTable,
    next_id: AtomicU64,
}

impl RpcTransport {
    pub fn new(settings: &ClientSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .connect_timeout(settings.connect_timeout())
            .danger_accept_invalid_certs(!settings.connection.verify_tls)
            .build()
            .map_err(|e| FmgError::Config(format!("failed to build HTTP client: {}", e)))?;

        let endpoint = settings.base_url()?.join("/jsonrpc")?;

        Ok(Self {
            client,
            endpoint,
            statuses: StatusTable::with_overrides(&settings.status_overrides),
            next_id: AtomicU64::new(1),
        })
    }

    /// Full URL of the JSON-RPC endpoint
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn statuses(&self) -> &StatusTable {
        &self.statuses
    }

    /// Send one envelope and parse the response.
    ///
    /// The returned envelope has exactly one sub-result per target, in
    /// request order; anything else is a [`FmgError::Transport`].
    #[instrument(skip(self, auth, targets), fields(targets = targets.len()))]
    pub async fn call(
        &self,
        auth: &AuthMaterial,
        method: Method,
        targets: &[Target],
    ) -> Result<ResponseEnvelope> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = RequestEnvelope::new(id, method, targets.to_vec(), auth.session_id());

        if tracing::enabled!(Level::DEBUG) {
            let logged = serde_json::to_value(&envelope).unwrap_or_default();
            debug!(request = %sanitize::redact(&logged), "Sending JSON-RPC request");
        }

        let mut request = self.client.post(self.endpoint.clone()).json(&envelope);
        if let Some(token) = auth.bearer() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(send_error)?;
        let status = response.status();
        let body = response.text().await.map_err(|e| FmgError::Connectivity {
            message: format!("failed to read response body: {}", e),
            request_sent: true,
        })?;

        if !status.is_success() {
            return Err(FmgError::Transport {
                status: Some(status.as_u16()),
                message: format!("HTTP {}", status),
                body,
            });
        }

        match parse_response(&body, &envelope, &self.statuses) {
            Ok(parsed) => {
                debug!(id, results = parsed.results.len(), "Received JSON-RPC response");
                Ok(parsed)
            }
            Err(message) => Err(FmgError::Transport {
                status: Some(status.as_u16()),
                message,
                body,
            }),
        }
    }
}

/// Classify a send failure by whether the request could have left the host.
fn send_error(err: reqwest::Error) -> FmgError {
    if err.is_connect() {
        FmgError::Connectivity {
            message: format!("cannot reach appliance: {}", err),
            request_sent: false,
        }
    } else if err.is_builder() {
        FmgError::Config(format!("invalid request: {}", err))
    } else if err.is_timeout() {
        FmgError::Connectivity {
            message: "request timed out".to_string(),
            request_sent: true,
        }
    } else {
        FmgError::Connectivity {
            message: err.to_string(),
            request_sent: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_from_settings() {
        let settings = ClientSettings::builder("fmg.example.net")
            .token("t")
            .port(8443)
            .build()
            .unwrap();
        let transport = RpcTransport::new(&settings).unwrap();
        assert_eq!(
            transport.endpoint().as_str(),
            "https://fmg.example.net:8443/jsonrpc"
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_not_sent() {
        // Port 9 on localhost is almost never listening
        let settings = ClientSettings::builder("http://127.0.0.1:9")
            .token("t")
            .connect_timeout_ms(500)
            .build()
            .unwrap();
        let transport = RpcTransport::new(&settings).unwrap();

        let err = transport
            .call(
                &AuthMaterial::Bearer("t".to_string()),
                Method::Get,
                &[Target::new("/sys/status")],
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FmgError::Connectivity {
                request_sent: false,
                ..
            }
        ));
    }
}
