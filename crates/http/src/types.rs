//! Wire types shared by the client and its callers

use serde::{Deserialize, Serialize};

/// Paginated list envelope returned by every list endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Whether the server reported a following page
    pub const fn has_next(&self) -> bool {
        self.next.is_some()
    }
}

/// Page cursor sent as query parameters to list endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageQuery {
    pub page: u32,
    pub page_size: u32,
}

/// Login credentials for `POST /auth/jwt/create`
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Token pair issued by the login endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPairResponse {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Refresh request body
#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

/// Refresh response; `refresh` is present when the server rotates refresh tokens
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn page_decodes_without_cursors() {
        let page: Page<serde_json::Value> =
            serde_json::from_value(json!({"count": 2, "results": [{"id": 1}, {"id": 2}]}))
                .unwrap();
        assert_eq!(page.count, 2);
        assert_eq!(page.results.len(), 2);
        assert!(!page.has_next());
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials::new("admin@example.org", "hunter2");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("admin@example.org"));
        assert!(!rendered.contains("hunter2"));
    }
}
