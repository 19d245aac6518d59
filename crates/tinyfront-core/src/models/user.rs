use serde::{Deserialize, Serialize};

/// The backend currently puts the user's group ids in `email`, so accept
/// either a single address or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(untagged)]
pub enum EmailField {
    Single(String),
    Many(Vec<String>),
}

impl EmailField {
    pub fn display(&self) -> String {
        match self {
            EmailField::Single(email) => email.clone(),
            EmailField::Many(values) => values.join(","),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<EmailField>,
}

impl UserInfo {
    /// One `key: value` line per field, in response order.
    pub fn display_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("id: {}", self.id),
            format!("name: {}", self.name),
        ];
        if let Some(ref email) = self.email {
            lines.push(format!("email: {}", email.display()));
        }
        lines
    }

    pub fn display(&self) -> String {
        self.display_lines().join("\n")
    }
}

/// Response body of `GET /user` and `GET /admin`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserEnvelope {
    #[serde(default)]
    pub message: Option<String>,
    pub user: UserInfo,
}
