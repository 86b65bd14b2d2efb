//! CAS 2.0 `/serviceValidate` XML responses.
//!
//! ```xml
//! <cas:serviceResponse xmlns:cas="http://www.yale.edu/tp/cas">
//!   <cas:authenticationSuccess>
//!     <cas:user>alice</cas:user>
//!     <cas:attributes>
//!       <cas:email>alice@example.com</cas:email>
//!     </cas:attributes>
//!   </cas:authenticationSuccess>
//! </cas:serviceResponse>
//! ```
//!
//! `authenticationFailure` is not inspected: without an `authenticationSuccess/user`
//! path the ticket is simply not validated.
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use tracing::{debug, error};

use super::ValidationError;
use crate::config::{CasOptions, DEFAULT_ATTRIBUTES_PARENT, DEFAULT_TICKET_NAMESPACE};
use crate::identity::Identity;

/// Per-server response dialect. Built from the options on each validation so
/// schemes with different CAS servers can share a process.
#[derive(Debug, Clone, Copy)]
pub struct Cas2Dialect<'a> {
    pub namespace: &'a str,
    pub attributes_parent: &'a str,
    pub name_identifier_attribute: Option<&'a str>,
}

impl Default for Cas2Dialect<'static> {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_TICKET_NAMESPACE,
            attributes_parent: DEFAULT_ATTRIBUTES_PARENT,
            name_identifier_attribute: None,
        }
    }
}

impl<'a> Cas2Dialect<'a> {
    pub fn from_options(options: &'a CasOptions) -> Self {
        Self {
            namespace: &options.ticket_namespace,
            attributes_parent: &options.attributes_parent,
            name_identifier_attribute: options.name_identifier_attribute.as_deref(),
        }
    }
}

pub fn parse_response(body: &str, dialect: &Cas2Dialect<'_>) -> Result<Identity, ValidationError> {
    let document = parse_document(body)?;
    let ns = dialect.namespace;

    let success = Some(&document)
        .filter(|root| root.is(ns, "serviceResponse"))
        .and_then(|root| root.child(ns, "authenticationSuccess"));

    let username = success
        .and_then(|success| success.child(ns, "user"))
        .map(|user| user.text.as_str())
        .filter(|user| !user.is_empty());

    let (success, username) = match (success, username) {
        (Some(success), Some(username)) => (success, username),
        _ => {
            debug!("CAS 2.0 response has no authenticated user");
            return Err(ValidationError::UsernameNotFound);
        }
    };

    let mut identity = Identity::from_username(username);

    let attributes = success.child(ns, dialect.attributes_parent);
    if let Some(attributes) = attributes {
        for attribute in &attributes.children {
            identity.add_attribute(attribute.local_name.clone(), attribute.text.clone());
        }
    }

    if let (Some(wanted), Some(attributes)) = (dialect.name_identifier_attribute, attributes) {
        let value = attributes
            .children
            .iter()
            .find(|attribute| attribute.local_name == wanted)
            .map(|attribute| attribute.text.as_str())
            .filter(|value| !value.is_empty());

        match value {
            Some(value) => identity.name_identifier = value.to_string(),
            None => {
                error!(attribute = wanted, user = username, "name identifier attribute missing from CAS response");
                return Err(ValidationError::IdentityAttributeNotFound {
                    attribute: wanted.to_string(),
                    username: username.to_string(),
                });
            }
        }
    }

    Ok(identity)
}

/// Element tree kept as small as the walk above needs. `text` is the
/// concatenated text of the element and all of its descendants.
#[derive(Debug)]
struct Element {
    namespace: Option<String>,
    local_name: String,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn new(ns: &ResolveResult<'_>, local_name: &[u8]) -> Self {
        let namespace = match ns {
            ResolveResult::Bound(Namespace(ns)) => Some(String::from_utf8_lossy(ns).into_owned()),
            _ => None,
        };

        Self {
            namespace,
            local_name: String::from_utf8_lossy(local_name).into_owned(),
            children: Vec::new(),
            text: String::new(),
        }
    }

    fn is(&self, ns: &str, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace.as_deref() == Some(ns)
    }

    fn child(&self, ns: &str, local_name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.is(ns, local_name))
    }
}

/// Deepest element nesting accepted. A CAS 2.0 answer needs four levels.
const MAX_DEPTH: usize = 16;

fn parse_document(xml: &str) -> Result<Element, ValidationError> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut open: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let (ns, event) = reader
            .read_resolved_event()
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;

        match event {
            Event::Start(e) => {
                if open.len() >= MAX_DEPTH {
                    return Err(ValidationError::Malformed("document nested too deeply".into()));
                }
                open.push(Element::new(&ns, e.local_name().as_ref()));
            }
            Event::Empty(e) => {
                let element = Element::new(&ns, e.local_name().as_ref());
                attach(&mut open, &mut root, element)?;
            }
            Event::End(_) => {
                let element = open
                    .pop()
                    .ok_or_else(|| ValidationError::Malformed("unexpected end tag".into()))?;
                attach(&mut open, &mut root, element)?;
            }
            Event::Text(e) => {
                let text = e
                    .unescape()
                    .map_err(|e| ValidationError::Malformed(e.to_string()))?;
                if let Some(current) = open.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Event::CData(e) => {
                if let Some(current) = open.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !open.is_empty() {
        return Err(ValidationError::Malformed("unclosed element".into()));
    }
    root.ok_or_else(|| ValidationError::Malformed("no root element".into()))
}

fn attach(
    open: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), ValidationError> {
    match open.last_mut() {
        Some(parent) => {
            parent.text.push_str(&element.text);
            parent.children.push(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(ValidationError::Malformed("multiple root elements".into())),
    }
}
