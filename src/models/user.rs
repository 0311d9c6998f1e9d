use serde::{Deserialize, Serialize};

pub const DEMO_USER_ID: &str = "demo-user";

/// Identity of the signed-in user. Only `uid` is needed by the data layer;
/// the rest is profile information for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uid: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "photoURL")]
    pub photo_url: Option<String>,
}

impl User {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            email: None,
            photo_url: None,
        }
    }

    pub fn demo() -> Self {
        Self {
            uid: DEMO_USER_ID.to_string(),
            display_name: Some("Demo User".to_string()),
            email: Some("demo@example.com".to_string()),
            photo_url: Some("https://api.dicebear.com/7.x/avataaars/svg?seed=Felix".to_string()),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Name for greetings: display name, then email, then uid.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.uid)
    }
}
