use serde::{Deserialize, Serialize};

use super::{first_string, set_single, DirectoryEntity};
use crate::attrs::AttributeSet;
use crate::query::SearchKind;
use crate::reconcile::ReconcilePolicy;

pub const MEMBER: &str = "member";
pub const UNIQUE_MEMBER: &str = "uniqueMember";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GroupType {
    /// `groupOfNames` with `member`
    #[default]
    Regular,
    /// `groupOfUniqueNames` with `uniqueMember`
    Unique,
}

impl GroupType {
    pub fn object_class(&self) -> &'static str {
        match self {
            GroupType::Regular => "groupOfNames",
            GroupType::Unique => "groupOfUniqueNames",
        }
    }

    pub fn member_attribute(&self) -> &'static str {
        match self {
            GroupType::Regular => MEMBER,
            GroupType::Unique => UNIQUE_MEMBER,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Group {
    pub name: String,
    pub dn: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub group_type: GroupType,
    /// Member DNs
    pub members: Vec<String>,
}

impl Group {
    pub fn has_member(&self, dn: &str) -> bool {
        self.members
            .iter()
            .any(|member| member.eq_ignore_ascii_case(dn))
    }
}

impl DirectoryEntity for Group {
    const KIND: SearchKind = SearchKind::Group;
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
        attrs.set("objectClass", ["top", self.group_type.object_class()]);
        attrs.set("cn", [self.name.as_str()]);
        set_single(&mut attrs, "description", self.description.as_deref());

        // both object classes require at least one member value
        let attribute = self.group_type.member_attribute();
        if self.members.is_empty() {
            attrs.set(attribute, [""]);
        } else {
            attrs.set(attribute, self.members.iter().map(String::as_str));
        }
        attrs
    }

    fn from_attributes(dn: &str, attrs: &AttributeSet) -> Self {
        let group_type = if attrs.has_value("objectClass", GroupType::Unique.object_class())
            && !attrs.has_value("objectClass", GroupType::Regular.object_class())
        {
            GroupType::Unique
        } else {
            GroupType::Regular
        };

        let members = [MEMBER, UNIQUE_MEMBER]
            .into_iter()
            .filter_map(|attribute| attrs.strings(attribute))
            .flatten()
            .filter(|member| !member.is_empty())
            .collect();

        Self {
            name: first_string(attrs, "cn").unwrap_or_default(),
            dn: dn.to_string(),
            description: first_string(attrs, "description"),
            group_type,
            members,
        }
    }

    fn reconcile_policy() -> ReconcilePolicy {
        ReconcilePolicy::new(Self::NAMING_ATTRIBUTE).relationships(&[MEMBER, UNIQUE_MEMBER])
    }
}
