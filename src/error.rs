use thiserror::Error;

/// Failure to read or write the local server configuration database.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sql(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("No data directory could be found for this platform.")]
    NoDataDir,
}

/// Failure of a single request against a server's info endpoint.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[error("Invalid server address: {0}")]
    InvalidAddress(String),

    #[error("Unexpected response from server: {0}")]
    UnexpectedResponse(String),
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Invalid server address: {0}")]
    InvalidAddress(String),

    /// Both the secure and the insecure attempt failed. Carries the cause of
    /// the insecure attempt.
    #[error("Failed to reach {hostname} over https or http: {source}")]
    ProbeFailure {
        hostname: String,
        #[source]
        source: ApiError,
    },
}

#[derive(Debug, Error)]
pub enum ParleyError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Str(String),
}

impl From<String> for ParleyError {
    fn from(value: String) -> Self {
        ParleyError::Str(value)
    }
}

// we must manually implement serde::Serialize
impl serde::Serialize for ParleyError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}
