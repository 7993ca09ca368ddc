//! Kind-specific polling implementations (spec.md §4.8).

pub mod cron;
pub mod database;
pub mod email;
pub mod webhook;

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::errors::{FlowsmithError, Result};

/// The outcome of one poll: zero or more events, in arrival order.
#[derive(Debug, Default)]
pub struct PollOutcome {
    pub events: Vec<Value>,
}

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").unwrap())
}

/// Validates a table/column/watermark identifier against the strict
/// pattern required to resist injection (spec.md §4.8 "Database
/// polling", §8 property 7): letters/underscore + digits, optional
/// single `schema.table`, length <=128.
pub fn validate_identifier(ident: &str) -> Result<()> {
    if ident.is_empty() || ident.len() > 128 || !identifier_re().is_match(ident) {
        return Err(FlowsmithError::InvalidIdentifier(ident.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_identifiers() {
        for ok in ["users", "_hidden", "schema.table"] {
            assert!(validate_identifier(ok).is_ok(), "{ok} should be valid");
        }
    }

    #[test]
    fn rejects_invalid_identifiers() {
        let long = "a".repeat(129);
        for bad in [
            "1table",
            "a b",
            "a-b",
            "users; DROP",
            "users'--",
            "a.b.c",
            "",
            long.as_str(),
        ] {
            assert!(validate_identifier(bad).is_err(), "{bad} should be invalid");
        }
    }
}
