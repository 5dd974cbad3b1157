//! Connection state tracking for configured chat servers.
//!
//! [`ConnectionStateStore`] is the only writer of [`ServerConfig`] records.
//! Rendering code and the connection workflow read records through it and
//! drive them through the lifecycle:
//!
//! | From                       | Event              | To              |
//! |----------------------------|--------------------|-----------------|
//! | (none)                     | `set_state(X)`     | X               |
//! | Ready                      | begin connecting   | Connecting      |
//! | Connecting                 | handshake succeeds | Connected       |
//! | Connecting / Connected     | transport failure  | ConnectionError |
//! | ConnectionError            | retry initiated    | Connecting      |
//! | any                        | same state         | unchanged       |

use std::error::Error;
use std::fmt::Display;

use crate::db::{ConnectionState, DbController, ServerConfig};
use crate::error::StoreError;

pub struct ConnectionStateStore {
    db: DbController,
}

impl ConnectionStateStore {
    pub fn new(db: DbController) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DbController {
        &self.db
    }

    /// Moves `server_config_id` to `state`, creating the record if needed.
    ///
    /// Nothing is written when the record already holds `state`. Returns
    /// whether a write happened.
    pub async fn try_set_state(
        &self,
        server_config_id: &str,
        state: ConnectionState,
    ) -> Result<bool, StoreError> {
        let written = self.db.update_state(server_config_id, state).await?;
        if written {
            log::debug!("{} -> {}", server_config_id, state);
        }
        Ok(written)
    }

    /// Best-effort [`Self::try_set_state`]: persistence errors are logged and
    /// reported as "not written".
    pub async fn set_state(&self, server_config_id: &str, state: ConnectionState) -> bool {
        log_if_error(
            "update state",
            server_config_id,
            self.try_set_state(server_config_id, state).await,
        )
        .unwrap_or(false)
    }

    /// Puts the record into the error state with `failure_reason`, even if it
    /// is already there, and drops its session.
    pub async fn try_record_connection_error(
        &self,
        server_config_id: &str,
        failure_reason: &str,
    ) -> Result<(), StoreError> {
        self.db
            .save_connection_error(server_config_id, failure_reason)
            .await?;
        log::warn!(
            "Connection to {} failed: {}",
            server_config_id,
            failure_reason
        );
        Ok(())
    }

    /// Best-effort [`Self::try_record_connection_error`]. Never fails.
    pub async fn record_connection_error(
        &self,
        server_config_id: &str,
        failure_reason: impl Display,
    ) {
        let reason = failure_reason.to_string();
        if let Err(e) = self
            .try_record_connection_error(server_config_id, &reason)
            .await
        {
            log::error!("{}", unrecorded_error_message(server_config_id, &reason, &e));
        }
    }

    /// Entry point for faults detected by the session transport.
    pub async fn on_transport_failure(
        &self,
        server_config_id: &str,
        fault: &(dyn Error + Send + Sync),
    ) {
        let reason = fault.to_string();
        self.record_connection_error(server_config_id, reason).await
    }

    pub async fn save_server(
        &self,
        server_config_id: &str,
        hostname: &str,
    ) -> Result<(), StoreError> {
        self.db.save_server(server_config_id, hostname).await?;
        log::info!("Saved server {} ({})", server_config_id, hostname);
        Ok(())
    }

    pub async fn set_session(
        &self,
        server_config_id: &str,
        session: &str,
    ) -> Result<(), StoreError> {
        Ok(self.db.save_session(server_config_id, Some(session)).await?)
    }

    /// Ends the session: the record goes back to `Ready` without a token.
    pub async fn disconnect(&self, server_config_id: &str) -> Result<(), StoreError> {
        self.db.reset_connection(server_config_id).await?;
        log::debug!("{} disconnected", server_config_id);
        Ok(())
    }

    /// Stores the first probe result for the server. Later calls do nothing
    /// and return `false`.
    pub async fn set_secure_connection(
        &self,
        server_config_id: &str,
        secure: bool,
    ) -> Result<bool, StoreError> {
        let written = self
            .db
            .save_secure_connection(server_config_id, secure)
            .await?;
        if !written {
            log::debug!(
                "Secure flag of {} already recorded, ignoring",
                server_config_id
            );
        }
        Ok(written)
    }

    pub async fn get(&self, server_config_id: &str) -> Result<Option<ServerConfig>, StoreError> {
        Ok(self.db.get_server(server_config_id).await?)
    }

    pub async fn list(&self) -> Result<Vec<ServerConfig>, StoreError> {
        Ok(self.db.get_all_servers().await?)
    }

    /// Forgets the server. Returns whether a record existed.
    pub async fn delete(&self, server_config_id: &str) -> Result<bool, StoreError> {
        let deleted = self.db.delete_server(server_config_id).await?;
        if deleted {
            log::info!("Removed server {}", server_config_id);
        }
        Ok(deleted)
    }
}

fn log_if_error<T>(action: &str, server_config_id: &str, res: Result<T, StoreError>) -> Option<T> {
    match res {
        Ok(x) => Some(x),
        Err(e) => {
            log::error!("Failed to {} for {}: {}", action, server_config_id, e);
            None
        }
    }
}

/// Log line for a connection error that could not be persisted. Carries the
/// original failure text, since it exists nowhere else.
fn unrecorded_error_message(server_config_id: &str, reason: &str, e: &StoreError) -> String {
    format!(
        "Failed to record connection error for {} (\"{}\"): {}",
        server_config_id, reason, e
    )
}
