use serde::{Deserialize, Serialize};

/// Raw answer of the info endpoint: the protocol it was served over and the
/// JSON body as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiInfoResponse {
    pub protocol: String,
    pub data: serde_json::Value,
}

/// Outcome of a capability probe. Never persisted as a whole; only
/// `is_secure` ends up in the server's record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub is_secure: bool,
    pub metadata: serde_json::Value,
}

impl ServerInfo {
    pub fn version(&self) -> Option<&str> {
        self.metadata.get("version").and_then(|x| x.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_version_from_metadata() {
        let info = ServerInfo {
            is_secure: true,
            metadata: json!({ "version": "0.47.0", "success": true }),
        };
        assert_eq!(info.version(), Some("0.47.0"));

        let info = ServerInfo {
            is_secure: false,
            metadata: json!({ "success": true }),
        };
        assert_eq!(info.version(), None);
    }
}
