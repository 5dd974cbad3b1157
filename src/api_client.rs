use std::time::Duration;

use crate::apis::{API_INFO_PATH, ApiInfoResponse, ServerPolicyApi, Transport};
use crate::error::ApiError;
use reqwest::Client;
use url::Url;

/// [`ServerPolicyApi`] over plain HTTP(S) requests.
#[derive(Clone, Debug)]
pub struct HttpServerPolicyApi {
    client: Client,
}

impl HttpServerPolicyApi {
    pub fn new(timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("parley/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

/// `{scheme}://{hostname}/api/info`
pub fn api_info_url(hostname: &str, transport: Transport) -> Result<Url, ApiError> {
    let base = Url::parse(&format!(
        "{}://{}/",
        transport.scheme(),
        hostname.trim_end_matches('/')
    ))?;
    if base.host_str().is_none_or(|host| host.is_empty()) {
        return Err(ApiError::InvalidAddress(hostname.to_string()));
    }
    Ok(base.join(API_INFO_PATH)?)
}

impl ServerPolicyApi for HttpServerPolicyApi {
    async fn get_api_info(
        &self,
        hostname: &str,
        transport: Transport,
    ) -> Result<ApiInfoResponse, ApiError> {
        let url = api_info_url(hostname, transport)?;
        log::debug!("GET {}", url);

        let res = self.client.get(url).send().await?.error_for_status()?;
        // Redirects may change the scheme; what counts is where we ended up.
        let protocol = res.url().scheme().to_string();
        let data = res.json::<serde_json::Value>().await?;
        if !data.is_object() {
            return Err(ApiError::UnexpectedResponse(format!(
                "expected a JSON object, got {}",
                data
            )));
        }
        Ok(ApiInfoResponse { protocol, data })
    }
}
