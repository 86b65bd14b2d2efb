//! Caller data carried across the CAS redirect round trip.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// String items plus the redirect target the user returns to once signed in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub items: HashMap<String, String>,
}

impl AuthProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_redirect_uri(redirect_uri: impl Into<String>) -> Self {
        Self {
            redirect_uri: Some(redirect_uri.into()),
            items: HashMap::new(),
        }
    }

    /// Redirect target, treating an empty string as absent.
    pub fn redirect_uri(&self) -> Option<&str> {
        self.redirect_uri.as_deref().filter(|uri| !uri.is_empty())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.items.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.items.remove(key)
    }
}
