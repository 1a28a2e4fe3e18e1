use crate::attrs::{same_values, AttributeSet, ModOperation, Modification, ModificationList};

pub const PASSWORD_ATTRIBUTE: &str = "userPassword";

/// How the attributes of one entity kind are compared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePolicy {
    /// Renames are not modifications
    pub naming_attribute: &'static str,
    pub excluded: Vec<&'static str>,
    /// Written whenever present, stored digests are never compared
    pub password_attribute: Option<&'static str>,
    /// Rewritten as a delete of the old values followed by an add
    pub relationship_attributes: Vec<&'static str>,
}

impl ReconcilePolicy {
    pub fn new(naming_attribute: &'static str) -> Self {
        Self {
            naming_attribute,
            excluded: vec!["objectClass"],
            password_attribute: None,
            relationship_attributes: Vec::new(),
        }
    }

    /// Policy of entities carrying a password
    pub fn account(naming_attribute: &'static str) -> Self {
        Self {
            password_attribute: Some(PASSWORD_ATTRIBUTE),
            ..Self::new(naming_attribute)
        }
    }

    pub fn excluding(mut self, attributes: &[&'static str]) -> Self {
        self.excluded.extend_from_slice(attributes);
        self
    }

    pub fn relationships(mut self, attributes: &[&'static str]) -> Self {
        self.relationship_attributes.extend_from_slice(attributes);
        self
    }

    fn is_excluded(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case(self.naming_attribute)
            || self.excluded.iter().any(|e| name.eq_ignore_ascii_case(e))
    }

    fn is_password(&self, name: &str) -> bool {
        self.password_attribute
            .is_some_and(|attribute| name.eq_ignore_ascii_case(attribute))
    }

    fn is_relationship(&self, name: &str) -> bool {
        self.relationship_attributes
            .iter()
            .any(|attribute| name.eq_ignore_ascii_case(attribute))
    }
}

/// Minimal modifications turning `current` into `desired`.
///
/// `current` has to be normalized through the same mapper that produced
/// `desired`. Attributes missing from `desired` are left alone.
pub fn reconcile(
    desired: &AttributeSet,
    current: &AttributeSet,
    policy: &ReconcilePolicy,
) -> ModificationList {
    let mut modifications = ModificationList::new();

    for attr in desired.iter() {
        if policy.is_excluded(&attr.name) {
            continue;
        }

        if policy.is_password(&attr.name) {
            if !attr.values.is_empty() {
                modifications.push(Modification::new(
                    ModOperation::Replace,
                    &attr.name,
                    attr.values.clone(),
                ));
            }
            continue;
        }

        let current_values = current
            .get(&attr.name)
            .map(|current| current.values.as_slice())
            .unwrap_or(&[]);

        if same_values(&attr.values, current_values) {
            continue;
        }

        if policy.is_relationship(&attr.name) {
            if !current_values.is_empty() {
                modifications.push(Modification::new(
                    ModOperation::Delete,
                    &attr.name,
                    current_values.to_vec(),
                ));
            }
            if !attr.values.is_empty() {
                modifications.push(Modification::new(
                    ModOperation::Add,
                    &attr.name,
                    attr.values.clone(),
                ));
            }
        } else {
            modifications.push(Modification::new(
                ModOperation::Replace,
                &attr.name,
                attr.values.clone(),
            ));
        }
    }

    modifications
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{DirectoryEntity, Group, Person};

    fn values(values: &[&str]) -> Vec<Vec<u8>> {
        values.iter().map(|v| v.as_bytes().to_vec()).collect()
    }

    fn person() -> Person {
        Person {
            name: "jdoe".to_string(),
            dn: "cn=jdoe,ou=people,dc=example,dc=com".to_string(),
            surname: Some("Doe".to_string()),
            mails: Some(vec!["jdoe@example.com".to_string()]),
            is_disabled: Some(false),
            ..Default::default()
        }
    }

    #[test]
    fn identical_entries_need_nothing() {
        let attrs = person().to_attributes();
        assert!(reconcile(&attrs, &attrs, &Person::reconcile_policy()).is_empty());

        let group = Group {
            name: "admins".to_string(),
            members: vec!["cn=a".to_string(), "cn=b".to_string()],
            ..Default::default()
        };
        let attrs = group.to_attributes();
        assert!(reconcile(&attrs, &attrs, &Group::reconcile_policy()).is_empty());
    }

    #[test]
    fn changed_attributes_are_replaced() {
        let current = person().to_attributes();
        let desired = Person {
            surname: Some("Doe-Smith".to_string()),
            mails: Some(vec!["jdoe@example.com".to_string(), "js@example.com".to_string()]),
            given_name: Some("Jane".to_string()),
            ..person()
        }
        .to_attributes();

        let modifications = reconcile(&desired, &current, &Person::reconcile_policy());
        assert_eq!(
            modifications,
            vec![
                Modification::new(ModOperation::Replace, "sn", values(&["Doe-Smith"])),
                Modification::new(ModOperation::Replace, "givenName", values(&["Jane"])),
                Modification::new(
                    ModOperation::Replace,
                    "mail",
                    values(&["jdoe@example.com", "js@example.com"])
                ),
            ]
        );
    }

    #[test]
    fn naming_and_object_classes_are_never_modified() {
        let mut current = person().to_attributes();
        current.set("objectClass", ["top", "person"]);
        let desired = Person {
            name: "renamed".to_string(),
            ..person()
        }
        .to_attributes();

        assert!(reconcile(&desired, &current, &Person::reconcile_policy()).is_empty());
    }

    #[test]
    fn explicit_clear_and_untouched_attributes() {
        let current = person().to_attributes();

        let cleared = Person {
            mails: Some(Vec::new()),
            ..person()
        }
        .to_attributes();
        assert_eq!(
            reconcile(&cleared, &current, &Person::reconcile_policy()),
            vec![Modification::new(ModOperation::Replace, "mail", Vec::new())]
        );

        let untouched = Person {
            mails: None,
            ..person()
        }
        .to_attributes();
        assert!(reconcile(&untouched, &current, &Person::reconcile_policy()).is_empty());
    }

    #[test]
    fn members_are_deleted_then_added() {
        let mut current = AttributeSet::new();
        current.set("member", ["b", "c"]);
        let mut desired = AttributeSet::new();
        desired.set("member", ["a", "b"]);

        let modifications = reconcile(&desired, &current, &Group::reconcile_policy());
        assert_eq!(
            modifications,
            vec![
                Modification::new(ModOperation::Delete, "member", values(&["b", "c"])),
                Modification::new(ModOperation::Add, "member", values(&["a", "b"])),
            ]
        );
    }

    #[test]
    fn relationship_delete_and_add_are_skipped_when_empty() {
        let mut desired = AttributeSet::new();
        desired.set("uniqueMember", ["a"]);
        assert_eq!(
            reconcile(&desired, &AttributeSet::new(), &Group::reconcile_policy()),
            vec![Modification::new(ModOperation::Add, "uniqueMember", values(&["a"]))]
        );

        let mut current = AttributeSet::new();
        current.set("uniqueMember", ["a"]);
        let mut desired = AttributeSet::new();
        desired.set("uniqueMember", Vec::<String>::new());
        assert_eq!(
            reconcile(&desired, &current, &Group::reconcile_policy()),
            vec![Modification::new(ModOperation::Delete, "uniqueMember", values(&["a"]))]
        );
    }

    #[test]
    fn passwords_are_always_replaced() {
        let attrs = person().to_attributes();
        let mut desired = attrs.clone();
        desired.set(PASSWORD_ATTRIBUTE, ["{SSHA}abc"]);
        let mut current = attrs;
        current.set(PASSWORD_ATTRIBUTE, ["{SSHA}abc"]);

        assert_eq!(
            reconcile(&desired, &current, &Person::reconcile_policy()),
            vec![Modification::new(
                ModOperation::Replace,
                PASSWORD_ATTRIBUTE,
                values(&["{SSHA}abc"])
            )]
        );
    }
}
