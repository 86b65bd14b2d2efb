//! CAS 1.0 `/validate`: line one is `yes` or `no`, line two the username.
use tracing::debug;

use super::ValidationError;
use crate::identity::Identity;

pub fn parse_response(body: &str) -> Result<Identity, ValidationError> {
    let mut lines = body.split('\n');

    match (lines.next(), lines.next()) {
        (Some("yes"), Some(username)) if !username.is_empty() => {
            Ok(Identity::from_username(username))
        }
        _ => {
            debug!("CAS 1.0 response did not confirm the ticket");
            Err(ValidationError::Rejected)
        }
    }
}
