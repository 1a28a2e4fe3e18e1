use serde::{Deserialize, Serialize};

use super::{
    first_string, read_description, set_multi, set_single, strings, write_description,
    DirectoryEntity,
};
use crate::attrs::AttributeSet;
use crate::query::SearchKind;
use crate::reconcile::ReconcilePolicy;

pub const OBJECT_CLASSES: [&str; 5] = [
    "top",
    "person",
    "inetOrgPerson",
    "organizationalPerson",
    "simpleSecurityObject",
];

/// Placeholder surname, `sn` is mandatory for `person`
pub const NO_SURNAME: &str = "---";

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Person {
    pub name: String,
    pub dn: String,
    pub surname: Option<String>,
    pub given_name: Option<String>,
    pub description: Option<String>,
    pub state: Option<String>,
    pub mails: Option<Vec<String>>,
    pub phones: Option<Vec<String>>,
    pub mobiles: Option<Vec<String>>,
    pub addresses: Option<Vec<String>>,
    pub ids: Option<Vec<String>>,
    pub is_disabled: Option<bool>,

    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl DirectoryEntity for Person {
    const KIND: SearchKind = SearchKind::Person;
    const NAMING_ATTRIBUTE: &'static str = "cn";

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
        set_single(&mut attrs, "givenName", self.given_name.as_deref());
        set_single(&mut attrs, "st", self.state.as_deref());
        set_multi(&mut attrs, "mail", self.mails.as_ref());
        set_multi(&mut attrs, "homePhone", self.phones.as_ref());
        set_multi(&mut attrs, "mobile", self.mobiles.as_ref());
        set_multi(&mut attrs, "street", self.addresses.as_ref());
        set_multi(&mut attrs, "uid", self.ids.as_ref());
        attrs
    }

    fn from_attributes(dn: &str, attrs: &AttributeSet) -> Self {
        let (description, is_disabled) = read_description(attrs);

        Self {
            name: first_string(attrs, "cn").unwrap_or_default(),
            dn: dn.to_string(),
            surname: first_string(attrs, "sn"),
            given_name: first_string(attrs, "givenName"),
            description,
            state: first_string(attrs, "st"),
            mails: strings(attrs, "mail"),
            phones: strings(attrs, "homePhone"),
            mobiles: strings(attrs, "mobile"),
            addresses: strings(attrs, "street"),
            ids: strings(attrs, "uid"),
            is_disabled,
            password: None,
        }
    }

    fn reconcile_policy() -> ReconcilePolicy {
        ReconcilePolicy::account(Self::NAMING_ATTRIBUTE)
    }

    fn secret(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jdoe() -> Person {
        Person {
            name: "jdoe".to_string(),
            dn: "cn=jdoe,ou=people,dc=example,dc=com".to_string(),
            surname: Some("Doe".to_string()),
            given_name: Some("John".to_string()),
            description: Some("Accounting".to_string()),
            mails: Some(vec![
                "jdoe@example.com".to_string(),
                "john.doe@example.com".to_string(),
            ]),
            phones: Some(vec!["+1 555 0100".to_string()]),
            is_disabled: Some(false),
            ..Default::default()
        }
    }

    #[test]
    fn mapping_is_stable() {
        let person = jdoe();
        let attrs = person.to_attributes();
        let read = Person::from_attributes(&person.dn, &attrs);

        assert_eq!(read, person);
        assert_eq!(read.to_attributes(), attrs);
    }

    #[test]
    fn passwords_never_reach_the_attributes() {
        let person = Person {
            password: Some("hunter2".to_string()),
            ..jdoe()
        };
        let attrs = person.to_attributes();
        assert!(!attrs.contains("userPassword"));
        assert_eq!(person.secret(), Some("hunter2"));

        let mut stored = attrs.clone();
        stored.set("userPassword", ["{SSHA}c2FsdGVk"]);
        assert_eq!(Person::from_attributes(&person.dn, &stored).password, None);
    }

    #[test]
    fn disabled_flag_round_trips() {
        let person = Person {
            is_disabled: Some(true),
            ..jdoe()
        };
        let attrs = person.to_attributes();
        assert_eq!(
            attrs.first_str("description"),
            Some("[DISABLED]Accounting")
        );

        let read = Person::from_attributes(&person.dn, &attrs);
        assert_eq!(read.is_disabled, Some(true));
        assert_eq!(read.description.as_deref(), Some("Accounting"));
        assert_eq!(read.to_attributes(), attrs);
    }

    #[test]
    fn defaults_and_explicit_clears() {
        let person = Person {
            name: "nobody".to_string(),
            mails: Some(Vec::new()),
            ..Default::default()
        };
        let attrs = person.to_attributes();

        assert_eq!(attrs.first_str("sn"), Some(NO_SURNAME));
        assert!(attrs.has_value("objectClass", "inetOrgPerson"));
        assert_eq!(attrs.strings("mail"), Some(Vec::new()));
        assert!(!attrs.contains("homePhone"));

        let read = Person::from_attributes("cn=nobody,dc=example,dc=com", &attrs);
        assert_eq!(read.mails, None);
        assert_eq!(read.phones, None);
        assert_eq!(read.is_disabled, Some(false));
    }

    #[test]
    fn deserializes_partial_json() {
        let person: Person =
            serde_json::from_str(r#"{"name": "jdoe", "password": "hunter2", "mails": []}"#)
                .unwrap();
        assert_eq!(person.name, "jdoe");
        assert_eq!(person.mails, Some(Vec::new()));
        assert_eq!(person.is_disabled, None);

        let json = serde_json::to_value(&person).unwrap();
        assert!(json.get("password").is_none());
    }
}
