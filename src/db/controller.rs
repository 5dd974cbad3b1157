use std::path::Path;
use std::time::Duration;

use super::server::{ConnectionState, ServerConfig};
use crate::error::StoreError;
use chrono::Utc;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

const SELECT_SERVER_CONFIG: &str = r#"
    SELECT
        server_config_id,
        hostname,
        state,
        session,
        secure_connection,
        error,
        updated_at
    FROM server_configs
"#;

/// Owns the SQLite pool holding every [`ServerConfig`].
///
/// Each write is a single `INSERT .. ON CONFLICT DO UPDATE` statement run in
/// its own transaction, so a record is created on first reference and only the
/// named columns of an existing record ever change.
pub struct DbController {
    pool: SqlitePool,
}

impl DbController {
    /// Opens (creating if needed) the database file at `path` and runs migrations.
    pub async fn open(path: &Path, max_connections: u32) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if !path.exists() {
            log::info!("Creating server database at {}", path.display());
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// A private in-memory database. A single long-lived connection is kept so
    /// the data survives for the life of the controller.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::migrate!().run(&pool).await?;
        Ok(Self { pool })
    }

    /// Writes `state` unless the record already holds it. Returns whether a
    /// row was written.
    pub async fn update_state(
        &self,
        server_config_id: &str,
        state: ConnectionState,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let written = sqlx::query(
            r#"
            INSERT INTO server_configs (server_config_id, state, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT (server_config_id) DO UPDATE
            SET
                state = excluded.state,
                updated_at = excluded.updated_at
            WHERE
                server_configs.state <> excluded.state
            "#,
        )
        .bind(server_config_id)
        .bind(state)
        .bind(Utc::now().naive_utc())
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;
        tx.commit().await?;
        Ok(written)
    }

    /// Moves the record into [`ConnectionState::ConnectionError`] with `error`
    /// as its message, dropping any session. Always writes.
    pub async fn save_connection_error(
        &self,
        server_config_id: &str,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO server_configs (server_config_id, state, error, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (server_config_id) DO UPDATE
            SET
                state = excluded.state,
                error = excluded.error,
                session = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(server_config_id)
        .bind(ConnectionState::ConnectionError)
        .bind(error)
        .bind(Utc::now().naive_utc())
        .execute(&mut *tx)
        .await?;
        tx.commit().await
    }

    /// Adds a server or changes the hostname of an existing one.
    pub async fn save_server(
        &self,
        server_config_id: &str,
        hostname: &str,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO server_configs (server_config_id, hostname, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT (server_config_id) DO UPDATE
            SET
                hostname = excluded.hostname,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(server_config_id)
        .bind(hostname)
        .bind(Utc::now().naive_utc())
        .execute(&mut *tx)
        .await?;
        tx.commit().await
    }

    pub async fn save_session(
        &self,
        server_config_id: &str,
        session: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO server_configs (server_config_id, session, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT (server_config_id) DO UPDATE
            SET
                session = excluded.session,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(server_config_id)
        .bind(session)
        .bind(Utc::now().naive_utc())
        .execute(&mut *tx)
        .await?;
        tx.commit().await
    }

    /// Records the outcome of the first capability probe. Once set the flag
    /// is never overwritten; returns `false` when the record was already probed.
    pub async fn save_secure_connection(
        &self,
        server_config_id: &str,
        secure: bool,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let written = sqlx::query(
            r#"
            INSERT INTO server_configs (server_config_id, secure_connection, secure_probed, updated_at)
            VALUES (?, ?, 1, ?)
            ON CONFLICT (server_config_id) DO UPDATE
            SET
                secure_connection = excluded.secure_connection,
                secure_probed = 1,
                updated_at = excluded.updated_at
            WHERE
                server_configs.secure_probed = 0
            "#,
        )
        .bind(server_config_id)
        .bind(secure)
        .bind(Utc::now().naive_utc())
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;
        tx.commit().await?;
        Ok(written)
    }

    /// Returns the record to [`ConnectionState::Ready`] and clears its session.
    pub async fn reset_connection(&self, server_config_id: &str) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO server_configs (server_config_id, state, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT (server_config_id) DO UPDATE
            SET
                state = excluded.state,
                session = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(server_config_id)
        .bind(ConnectionState::Ready)
        .bind(Utc::now().naive_utc())
        .execute(&mut *tx)
        .await?;
        tx.commit().await
    }

    pub async fn get_server(
        &self,
        server_config_id: &str,
    ) -> Result<Option<ServerConfig>, sqlx::Error> {
        let sql = format!("{} WHERE server_config_id = ?", SELECT_SERVER_CONFIG);
        sqlx::query_as::<_, ServerConfig>(&sql)
            .bind(server_config_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_all_servers(&self) -> Result<Vec<ServerConfig>, sqlx::Error> {
        let sql = format!("{} ORDER BY server_config_id", SELECT_SERVER_CONFIG);
        sqlx::query_as::<_, ServerConfig>(&sql)
            .fetch_all(&self.pool)
            .await
    }

    /// Removes the record. Returns whether one existed.
    pub async fn delete_server(&self, server_config_id: &str) -> Result<bool, sqlx::Error> {
        sqlx::query("DELETE FROM server_configs WHERE server_config_id = ?")
            .bind(server_config_id)
            .execute(&self.pool)
            .await
            .map(|x| x.rows_affected() > 0)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn db() -> DbController {
        DbController::open_in_memory()
            .await
            .expect("in-memory database must open")
    }

    #[tokio::test]
    async fn unknown_id_is_created_with_defaults() {
        let db = db().await;
        assert!(db
            .update_state("srv1", ConnectionState::Connecting)
            .await
            .unwrap());

        let config = db.get_server("srv1").await.unwrap().expect("record created");
        assert_eq!(config.server_config_id, "srv1");
        assert_eq!(config.state, ConnectionState::Connecting);
        assert_eq!(config.hostname, None);
        assert_eq!(config.session, None);
        assert_eq!(config.error, None);
        assert!(!config.secure_connection);
    }

    #[tokio::test]
    async fn repeated_state_writes_once() {
        let db = db().await;
        assert!(db.update_state("srv1", ConnectionState::Ready).await.unwrap());
        let first = db.get_server("srv1").await.unwrap().unwrap();

        assert!(!db.update_state("srv1", ConnectionState::Ready).await.unwrap());
        let second = db.get_server("srv1").await.unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn state_change_leaves_other_fields() {
        let db = db().await;
        db.save_server("srv1", "chat.example.org").await.unwrap();
        db.save_session("srv1", Some("token-1")).await.unwrap();
        db.save_connection_error("srv1", "timeout").await.unwrap();
        db.save_session("srv1", Some("token-2")).await.unwrap();

        assert!(db
            .update_state("srv1", ConnectionState::Connecting)
            .await
            .unwrap());
        assert!(db
            .update_state("srv1", ConnectionState::Connected)
            .await
            .unwrap());

        let config = db.get_server("srv1").await.unwrap().unwrap();
        assert_eq!(config.state, ConnectionState::Connected);
        assert_eq!(config.hostname.as_deref(), Some("chat.example.org"));
        assert_eq!(config.session.as_deref(), Some("token-2"));
        assert_eq!(config.error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn connection_error_always_overwrites_message() {
        let db = db().await;
        db.save_connection_error("srv1", "timeout").await.unwrap();
        db.save_connection_error("srv1", "connection refused")
            .await
            .unwrap();

        let config = db.get_server("srv1").await.unwrap().unwrap();
        assert_eq!(config.state, ConnectionState::ConnectionError);
        assert_eq!(config.last_error(), Some("connection refused"));
    }

    #[tokio::test]
    async fn connection_error_drops_session() {
        let db = db().await;
        db.update_state("srv1", ConnectionState::Connected)
            .await
            .unwrap();
        db.save_session("srv1", Some("token")).await.unwrap();
        db.save_connection_error("srv1", "socket closed")
            .await
            .unwrap();

        let config = db.get_server("srv1").await.unwrap().unwrap();
        assert_eq!(config.session, None);
    }

    #[tokio::test]
    async fn secure_flag_is_written_once() {
        let db = db().await;
        db.save_server("srv1", "chat.example.org").await.unwrap();
        assert!(db.save_secure_connection("srv1", true).await.unwrap());
        assert!(!db.save_secure_connection("srv1", false).await.unwrap());

        let config = db.get_server("srv1").await.unwrap().unwrap();
        assert!(config.secure_connection);
    }

    #[tokio::test]
    async fn reset_returns_to_ready_without_session() {
        let db = db().await;
        db.update_state("srv1", ConnectionState::Connected)
            .await
            .unwrap();
        db.save_session("srv1", Some("token")).await.unwrap();
        db.reset_connection("srv1").await.unwrap();

        let config = db.get_server("srv1").await.unwrap().unwrap();
        assert_eq!(config.state, ConnectionState::Ready);
        assert_eq!(config.session, None);
    }

    #[tokio::test]
    async fn opens_file_with_url_characters_in_path() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("servers?mode=ro#1.db");
        {
            let db = DbController::open(&path, 2).await.expect("database must open");
            db.save_server("srv1", "chat.example.org").await.unwrap();
            db.close().await;
        }
        assert!(path.exists());

        let db = DbController::open(&path, 2).await.expect("database must reopen");
        let config = db.get_server("srv1").await.unwrap().expect("record persisted");
        assert_eq!(config.hostname.as_deref(), Some("chat.example.org"));
        db.close().await;
    }

    #[tokio::test]
    async fn lists_and_deletes_servers() {
        let db = db().await;
        db.save_server("b", "b.example.org").await.unwrap();
        db.save_server("a", "a.example.org").await.unwrap();
        db.save_server("a", "chat.a.example.org").await.unwrap();

        let all = db.get_all_servers().await.unwrap();
        assert_eq!(
            all.iter()
                .map(|x| x.server_config_id.as_str())
                .collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(all[0].hostname.as_deref(), Some("chat.a.example.org"));

        assert!(db.delete_server("a").await.unwrap());
        assert!(!db.delete_server("a").await.unwrap());
        assert_eq!(db.get_server("a").await.unwrap(), None);
        assert_eq!(db.get_all_servers().await.unwrap().len(), 1);
    }
}
