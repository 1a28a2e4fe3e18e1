//! Typed projections of directory entries.
//!
//! Mapping is pure: `to_attributes` builds the attribute set an entity is
//! stored as and `from_attributes` projects a read entry back. Passwords only
//! travel from the caller to the managers, which store them hashed.

pub mod group;
pub mod ou;
pub mod person;
pub mod user;

pub use group::{Group, GroupType};
pub use ou::Ou;
pub use person::Person;
pub use user::User;

use crate::attrs::AttributeSet;
use crate::query::SearchKind;
use crate::reconcile::ReconcilePolicy;

/// Prefix marking a disabled account in its description
pub const DISABLED_PREFIX: &str = "[DISABLED]";

pub trait DirectoryEntity: Sized + Send + Sync {
    const KIND: SearchKind;
    const NAMING_ATTRIBUTE: &'static str;
    /// Attributes requested when reading a single entry
    const READ_ATTRIBUTES: &'static [&'static str] = &["*"];

    fn dn(&self) -> &str;
    fn set_dn(&mut self, dn: String);
    fn name(&self) -> &str;
    fn set_name(&mut self, name: String);

    fn to_attributes(&self) -> AttributeSet;
    fn from_attributes(dn: &str, attrs: &AttributeSet) -> Self;

    fn reconcile_policy() -> ReconcilePolicy;

    /// Clear text password to be stored with the entry
    fn secret(&self) -> Option<&str> {
        None
    }
}

/// `None` leaves the attribute out, an empty string clears it
pub(crate) fn set_single(attrs: &mut AttributeSet, name: &str, value: Option<&str>) {
    match value {
        None => {}
        Some("") => attrs.set(name, Vec::<String>::new()),
        Some(value) => attrs.set(name, [value]),
    }
}

/// `Some(vec![])` is kept as an attribute without values
pub(crate) fn set_multi(attrs: &mut AttributeSet, name: &str, values: Option<&Vec<String>>) {
    if let Some(values) = values {
        attrs.set(name, values.iter().map(String::as_str));
    }
}

/// Writes the description carrying the disabled sentinel.
///
/// With a known disabled state the description is always emitted, so that
/// enabling an account removes the sentinel even without a new description.
pub(crate) fn write_description(
    attrs: &mut AttributeSet,
    description: Option<&str>,
    is_disabled: Option<bool>,
) {
    let description = match (description, is_disabled) {
        (Some(description), Some(true)) if description.starts_with(DISABLED_PREFIX) => {
            Some(description.to_string())
        }
        (description, Some(true)) => Some(format!(
            "{DISABLED_PREFIX}{}",
            description.unwrap_or_default()
        )),
        (Some(description), _) => Some(description.to_string()),
        (None, Some(false)) => Some(String::new()),
        (None, None) => None,
    };

    set_single(attrs, "description", description.as_deref());
}

/// Splits a stored description into the caller visible text and the
/// disabled flag. An absent description means enabled.
pub(crate) fn read_description(attrs: &AttributeSet) -> (Option<String>, Option<bool>) {
    match attrs.first_str("description") {
        Some(description) => match description.strip_prefix(DISABLED_PREFIX) {
            Some("") => (None, Some(true)),
            Some(rest) => (Some(rest.to_string()), Some(true)),
            None => (Some(description.to_string()), Some(false)),
        },
        None => (None, Some(false)),
    }
}

pub(crate) fn first_string(attrs: &AttributeSet, name: &str) -> Option<String> {
    attrs.first_str(name).map(str::to_string)
}

/// Multi-valued read: absent stays `None`
pub(crate) fn strings(attrs: &AttributeSet, name: &str) -> Option<Vec<String>> {
    attrs.strings(name).filter(|values| !values.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn description_of(description: Option<&str>, is_disabled: Option<bool>) -> Option<Vec<String>> {
        let mut attrs = AttributeSet::new();
        write_description(&mut attrs, description, is_disabled);
        attrs.strings("description")
    }

    #[test]
    fn disabled_sentinel_is_added_once() {
        assert_eq!(
            description_of(Some("intern"), Some(true)),
            Some(vec!["[DISABLED]intern".to_string()])
        );
        assert_eq!(
            description_of(Some("[DISABLED]intern"), Some(true)),
            Some(vec!["[DISABLED]intern".to_string()])
        );
        assert_eq!(
            description_of(None, Some(true)),
            Some(vec!["[DISABLED]".to_string()])
        );
        assert_eq!(
            description_of(Some("intern"), Some(false)),
            Some(vec!["intern".to_string()])
        );
        assert_eq!(description_of(None, Some(false)), Some(Vec::new()));
        assert_eq!(description_of(None, None), None);
    }

    #[test]
    fn disabled_sentinel_is_stripped() {
        let mut attrs = AttributeSet::new();
        attrs.set("description", ["[DISABLED]intern"]);
        assert_eq!(
            read_description(&attrs),
            (Some("intern".to_string()), Some(true))
        );

        attrs.set("description", ["[DISABLED]"]);
        assert_eq!(read_description(&attrs), (None, Some(true)));

        attrs.set("description", ["intern [DISABLED]"]);
        assert_eq!(
            read_description(&attrs),
            (Some("intern [DISABLED]".to_string()), Some(false))
        );

        assert_eq!(read_description(&AttributeSet::new()), (None, Some(false)));
    }
}
