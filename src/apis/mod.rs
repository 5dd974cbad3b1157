use std::future::Future;

use crate::error::ApiError;

pub mod dtos;
pub mod probe;

pub use dtos::{ApiInfoResponse, ServerInfo};
pub use probe::{ApiVersionProbe, check_connection, normalize_hostname};

/// Protocol identifier a server must answer with to count as secure.
pub const SECURE_PROTOCOL: &str = "https";
pub const INSECURE_PROTOCOL: &str = "http";
pub const API_INFO_PATH: &str = "api/info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Secure,
    Insecure,
}

impl Transport {
    pub fn scheme(self) -> &'static str {
        match self {
            Transport::Secure => SECURE_PROTOCOL,
            Transport::Insecure => INSECURE_PROTOCOL,
        }
    }
}

/// Access to a server's API info endpoint over a given transport.
pub trait ServerPolicyApi {
    fn get_api_info(
        &self,
        hostname: &str,
        transport: Transport,
    ) -> impl Future<Output = Result<ApiInfoResponse, ApiError>> + Send;
}
