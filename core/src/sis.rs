//! SIS identifier references.
//!
//! Canvas accepts `sis_{field}_id:{value}` wherever a numeric id is expected
//! in a URL path. The value is percent-encoded so identifiers containing
//! `/`, spaces or `:` stay a single path segment.

use std::fmt;

/// Which SIS identifier namespace a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SisField {
    Account,
    Course,
    Section,
    User,
    Login,
}

impl SisField {
    pub fn as_str(self) -> &'static str {
        match self {
            SisField::Account => "account",
            SisField::Course => "course",
            SisField::Section => "section",
            SisField::User => "user",
            SisField::Login => "login",
        }
    }
}

impl fmt::Display for SisField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the path-ready reference for `value` in the `field` namespace.
pub fn sis_id(value: &str, field: SisField) -> String {
    format!("sis_{field}_id:{}", urlencoding::encode(value))
}
