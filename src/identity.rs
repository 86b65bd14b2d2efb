use serde::Serialize;

/// A validated CAS principal.
///
/// `attributes` keeps document order and duplicate names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub name: String,
    pub name_identifier: String,
    pub attributes: Vec<(String, String)>,
}

impl Identity {
    /// Identity with no attributes whose name identifier is the username.
    pub fn from_username(username: impl Into<String>) -> Self {
        let name = username.into();
        Self {
            name_identifier: name.clone(),
            name,
            attributes: Vec::new(),
        }
    }

    /// First value of the attribute named `name`.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Every value of the attribute named `name`, in document order.
    pub fn attribute_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.attributes
            .iter()
            .filter(move |(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn add_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.push((name.into(), value.into()));
    }

    pub(crate) fn is_complete(&self) -> bool {
        !self.name.is_empty() && !self.name_identifier.is_empty()
    }
}
