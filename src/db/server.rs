use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use sqlx::prelude::FromRow;

/// Lifecycle of the connection to one configured server.
///
/// Stored as an integer so records written by older clients stay readable.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize_repr,
    Deserialize_repr,
    sqlx::Type,
    clap::ValueEnum,
)]
#[repr(i32)]
pub enum ConnectionState {
    #[default]
    Ready = 0,
    Connecting = 1,
    Connected = 2,
    #[value(alias = "error")]
    ConnectionError = 3,
}

impl ConnectionState {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for ConnectionState {
    type Error = i32;
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ConnectionState::Ready),
            1 => Ok(ConnectionState::Connecting),
            2 => Ok(ConnectionState::Connected),
            3 => Ok(ConnectionState::ConnectionError),
            other => Err(other),
        }
    }
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Ready => "Ready",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::ConnectionError => "Connection Error",
        })
    }
}

impl FromStr for ConnectionState {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], " ").trim() {
            "ready" => Ok(ConnectionState::Ready),
            "connecting" => Ok(ConnectionState::Connecting),
            "connected" => Ok(ConnectionState::Connected),
            "connection error" | "connectionerror" | "error" => {
                Ok(ConnectionState::ConnectionError)
            }
            _ => Err(()),
        }
    }
}

/// Locally persisted configuration and connection state of one chat server.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq, FromRow)]
pub struct ServerConfig {
    pub server_config_id: String,
    pub hostname: Option<String>,
    pub state: ConnectionState,
    pub session: Option<String>,
    pub secure_connection: bool,
    pub error: Option<String>,
    pub updated_at: NaiveDateTime,
}

impl ServerConfig {
    /// The stored error text, only while the record is in the error state.
    pub fn last_error(&self) -> Option<&str> {
        match self.state {
            ConnectionState::ConnectionError => self.error.as_deref(),
            _ => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn to_short_id_string(&self) -> String {
        format!(
            "{:<24} {:<32} {:<16}{}",
            self.server_config_id,
            self.hostname.as_deref().unwrap_or("-"),
            self.state.to_string(),
            self.last_error()
                .map(|e| format!(" ({})", e))
                .unwrap_or_default()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_state_names() {
        assert_eq!("ready".parse::<ConnectionState>(), Ok(ConnectionState::Ready));
        assert_eq!("Connecting".parse::<ConnectionState>(), Ok(ConnectionState::Connecting));
        assert_eq!("connection-error".parse::<ConnectionState>(), Ok(ConnectionState::ConnectionError));
        assert_eq!("Connection Error".parse::<ConnectionState>(), Ok(ConnectionState::ConnectionError));
        assert_eq!("offline".parse::<ConnectionState>(), Err(()));
    }

    #[test]
    fn state_integers_match_stored_values() {
        for state in [
            ConnectionState::Ready,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::ConnectionError,
        ] {
            assert_eq!(ConnectionState::try_from(state.as_i32()), Ok(state));
        }
        assert_eq!(ConnectionState::try_from(7), Err(7));
        assert_eq!(
            serde_json::to_string(&ConnectionState::ConnectionError).unwrap(),
            "3"
        );
    }

    #[test]
    fn error_text_only_visible_in_error_state() {
        let mut config = ServerConfig {
            server_config_id: "srv1".into(),
            state: ConnectionState::Connecting,
            error: Some("timeout".into()),
            ..Default::default()
        };
        assert_eq!(config.last_error(), None);

        config.state = ConnectionState::ConnectionError;
        assert_eq!(config.last_error(), Some("timeout"));
        assert!(config.to_short_id_string().ends_with("(timeout)"));
    }
}
