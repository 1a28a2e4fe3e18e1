use serde::{Deserialize, Serialize};

use super::{first_string, read_description, write_description, DirectoryEntity};
use crate::attrs::AttributeSet;
use crate::entity::person::NO_SURNAME;
use crate::query::SearchKind;
use crate::reconcile::ReconcilePolicy;

pub const OBJECT_CLASSES: [&str; 3] = ["top", "person", "simpleSecurityObject"];

/// 389ds operational attribute set by account lockout
pub const ACCOUNT_LOCK: &str = "nsAccountLock";

/// Service or login account without personal data
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct User {
    pub name: String,
    pub dn: String,
    pub surname: Option<String>,
    pub description: Option<String>,
    pub is_disabled: Option<bool>,

    /// Reported by the server, never written
    #[serde(skip_deserializing)]
    pub is_locked: bool,

    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl DirectoryEntity for User {
    const KIND: SearchKind = SearchKind::User;
    const NAMING_ATTRIBUTE: &'static str = "cn";
    const READ_ATTRIBUTES: &'static [&'static str] = &["*", ACCOUNT_LOCK];

    fn dn(&self) -> &str {
        &self.dn
    }

    fn set_dn(&mut self, dn: String) {
        self.dn = dn;
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn to_attributes(&self) -> AttributeSet {
        let mut attrs = AttributeSet::new();
        attrs.set("objectClass", OBJECT_CLASSES);
        attrs.set("cn", [self.name.as_str()]);
        attrs.set("sn", [self.surname.as_deref().unwrap_or(NO_SURNAME)]);
        write_description(&mut attrs, self.description.as_deref(), self.is_disabled);
        attrs
    }

    fn from_attributes(dn: &str, attrs: &AttributeSet) -> Self {
        let (description, is_disabled) = read_description(attrs);

        Self {
            name: first_string(attrs, "cn").unwrap_or_default(),
            dn: dn.to_string(),
            surname: first_string(attrs, "sn"),
            description,
            is_disabled,
            is_locked: attrs.has_value(ACCOUNT_LOCK, "true"),
            password: None,
        }
    }

    fn reconcile_policy() -> ReconcilePolicy {
        ReconcilePolicy::account(Self::NAMING_ATTRIBUTE).excluding(&[ACCOUNT_LOCK])
    }

    fn secret(&self) -> Option<&str> {
        self.password.as_deref()
    }
}
