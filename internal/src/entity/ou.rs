use serde::{Deserialize, Serialize};

use super::{first_string, set_single, DirectoryEntity};
use crate::attrs::AttributeSet;
use crate::query::SearchKind;
use crate::reconcile::ReconcilePolicy;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Ou {
    pub name: String,
    pub dn: String,
    pub description: Option<String>,
}

impl DirectoryEntity for Ou {
    const KIND: SearchKind = SearchKind::Ou;
    const NAMING_ATTRIBUTE: &'static str = "ou";

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
        attrs.set("objectClass", ["top", "organizationalUnit"]);
        attrs.set("ou", [self.name.as_str()]);
        set_single(&mut attrs, "description", self.description.as_deref());
        attrs
    }

    fn from_attributes(dn: &str, attrs: &AttributeSet) -> Self {
        Self {
            name: first_string(attrs, "ou").unwrap_or_default(),
            dn: dn.to_string(),
            description: first_string(attrs, "description"),
        }
    }

    fn reconcile_policy() -> ReconcilePolicy {
        ReconcilePolicy::new(Self::NAMING_ATTRIBUTE)
    }
}
