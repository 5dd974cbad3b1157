use url::Url;

use super::{ApiInfoResponse, SECURE_PROTOCOL, ServerInfo, ServerPolicyApi, Transport};
use crate::db::ConnectionState;
use crate::error::{ProbeError, StoreError};
use crate::tracker::ConnectionStateStore;

/// Finds out whether a server speaks https or only http.
///
/// The secure variant is tried first; any failure causes exactly one retry
/// over plain http.
pub struct ApiVersionProbe<A> {
    api: A,
}

impl<A: ServerPolicyApi> ApiVersionProbe<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub async fn probe(&self, server_address: &str) -> Result<ServerInfo, ProbeError> {
        let hostname = normalize_hostname(server_address)
            .ok_or_else(|| ProbeError::InvalidAddress(server_address.to_string()))?;

        let (is_secure, response) = match self.api.get_api_info(&hostname, Transport::Secure).await
        {
            Ok(response) => (response.protocol == SECURE_PROTOCOL, response),
            Err(e) => {
                log::debug!("Secure probe of {} failed, falling back to http: {}", hostname, e);
                let response: ApiInfoResponse = self
                    .api
                    .get_api_info(&hostname, Transport::Insecure)
                    .await
                    .map_err(|source| ProbeError::ProbeFailure {
                        hostname: hostname.clone(),
                        source,
                    })?;
                (false, response)
            }
        };

        log::info!(
            "Probed {}: {}",
            hostname,
            if is_secure { "secure" } else { "insecure" }
        );
        Ok(ServerInfo {
            is_secure,
            metadata: response.data,
        })
    }
}

/// Stores the probe outcome as the server's secure-connection flag.
pub async fn apply_server_info(
    store: &ConnectionStateStore,
    server_config_id: &str,
    info: &ServerInfo,
) -> Result<bool, StoreError> {
    store
        .set_secure_connection(server_config_id, info.is_secure)
        .await
}

/// Drives a configured server through a connection check: `Connecting`, then
/// `Connected` with the secure flag recorded, or `ConnectionError` with the
/// probe failure. Storage failures are logged and never surface.
pub async fn check_connection<A: ServerPolicyApi>(
    store: &ConnectionStateStore,
    probe: &ApiVersionProbe<A>,
    server_config_id: &str,
    hostname: &str,
) -> Result<ServerInfo, ProbeError> {
    store
        .set_state(server_config_id, ConnectionState::Connecting)
        .await;
    match probe.probe(hostname).await {
        Ok(info) => {
            if let Err(e) = apply_server_info(store, server_config_id, &info).await {
                log::error!(
                    "Failed to record secure flag for {}: {}",
                    server_config_id,
                    e
                );
            }
            store
                .set_state(server_config_id, ConnectionState::Connected)
                .await;
            Ok(info)
        }
        Err(e) => {
            store.record_connection_error(server_config_id, &e).await;
            Err(e)
        }
    }
}

/// Reduces a user-entered server address to `host[:port][/path]`.
///
/// Accepts a bare host or an `http://`/`https://` URL; returns `None` for
/// anything that is not a valid host.
pub fn normalize_hostname(address: &str) -> Option<String> {
    let trimmed = address.trim();
    let without_scheme = ["https://", "http://"]
        .iter()
        .find_map(|prefix| {
            trimmed
                .get(..prefix.len())
                .filter(|head| head.eq_ignore_ascii_case(prefix))
                .map(|_| &trimmed[prefix.len()..])
        })
        .unwrap_or(trimmed);
    let hostname = without_scheme.trim_end_matches('/');

    if hostname.is_empty() || hostname.contains("://") || hostname.contains(char::is_whitespace)
    {
        return None;
    }
    Url::parse(&format!("{}://{}/", SECURE_PROTOCOL, hostname))
        .ok()
        .filter(|url| url.host_str().is_some_and(|host| !host.is_empty()))
        .map(|_| hostname.to_string())
}
