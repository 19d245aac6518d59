use serde::{Deserialize, Serialize};

/// Backend health check result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    /// Parse a health response body: `{"status": ...}` JSON or plain text.
    pub fn from_body(body: &str) -> Self {
        match serde_json::from_str::<HealthStatus>(body) {
            Ok(health) => health,
            Err(_) => Self {
                status: body.trim().trim_matches('"').to_string(),
            },
        }
    }

    pub fn display(&self) -> String {
        format!("Health: {}", self.status)
    }
}
