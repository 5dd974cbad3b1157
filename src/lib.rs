//! Server configuration records and connection state tracking for a chat
//! client, plus the https/http capability probe used before connecting.

pub mod api_client;
pub mod apis;
pub mod config;
pub mod db;
pub mod error;
pub mod tracker;

pub use api_client::HttpServerPolicyApi;
pub use apis::{ApiVersionProbe, ServerInfo, ServerPolicyApi, Transport};
pub use db::{ConnectionState, DbController, ServerConfig};
pub use error::{ApiError, ParleyError, ProbeError, StoreError};
pub use tracker::ConnectionStateStore;
