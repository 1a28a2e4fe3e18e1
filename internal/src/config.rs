use crate::LdapConfig;
use serde::Deserialize;

/// Relative bases, joined with the root search base, used when a listing
/// does not name its own
#[derive(Deserialize, Debug, Clone, Default)]
pub struct EntityBases {
    #[serde(default)]
    pub people: String,

    #[serde(default)]
    pub users: String,

    #[serde(default)]
    pub groups: String,

    #[serde(default)]
    pub ous: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct CommonConfig {
    #[serde(flatten)]
    pub ldap_config: LdapConfig,

    #[serde(default)]
    pub bases: EntityBases,
}
