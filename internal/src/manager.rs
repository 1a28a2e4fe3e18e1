use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use ldap3::ldap_escape;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::attrs::AttributeSet;
use crate::auth::AuthValidator;
use crate::dn;
use crate::entity::{DirectoryEntity, Group, Ou, Person, User};
use crate::error::{DirectoryError, Result};
use crate::pool::{ConnectionPool, RandomSelection, SelectionStrategy};
use crate::query::{QueryManager, SearchKind};
use crate::reconcile::reconcile;
use crate::secret::{hash_password, PasswordScheme};
use crate::session::{DirectoryConnector, LdapConnector};
use crate::LdapConfig;

/// What `save` ended up doing
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created,
    Updated,
}

/// Root object owning the pool, the executor and the validator
pub struct Directory {
    pool: Arc<ConnectionPool>,
    queries: Arc<QueryManager>,
    auth: Arc<AuthValidator>,
    scheme: PasswordScheme,
}

impl Directory {
    pub fn new(config: &LdapConfig) -> Result<Self> {
        Self::with_connector(
            config,
            Arc::new(LdapConnector::new(config)),
            Arc::new(RandomSelection),
        )
    }

    pub fn with_connector(
        config: &LdapConfig,
        connector: Arc<dyn DirectoryConnector>,
        strategy: Arc<dyn SelectionStrategy>,
    ) -> Result<Self> {
        let pool = Arc::new(ConnectionPool::new(
            config,
            connector.clone(),
            strategy.clone(),
        )?);
        let queries = Arc::new(QueryManager::new(config, pool.clone()));
        let auth = Arc::new(AuthValidator::new(
            config.servers.clone(),
            connector,
            strategy,
        ));

        Ok(Self {
            pool,
            queries,
            auth,
            scheme: config.password_scheme,
        })
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn queries(&self) -> &Arc<QueryManager> {
        &self.queries
    }

    pub fn auth(&self) -> &Arc<AuthValidator> {
        &self.auth
    }

    fn entities<E: DirectoryEntity>(&self) -> EntityManager<E> {
        EntityManager {
            queries: self.queries.clone(),
            scheme: self.scheme,
            entity: PhantomData,
        }
    }

    pub fn people(&self) -> PeopleManager {
        PeopleManager {
            entities: self.entities(),
            auth: self.auth.clone(),
        }
    }

    pub fn users(&self) -> UserManager {
        UserManager {
            entities: self.entities(),
            auth: self.auth.clone(),
        }
    }

    pub fn groups(&self) -> GroupManager {
        GroupManager {
            entities: self.entities(),
        }
    }

    pub fn ous(&self) -> EntityManager<Ou> {
        self.entities()
    }
}

/// CRUD shared by every entity kind
pub struct EntityManager<E> {
    queries: Arc<QueryManager>,
    scheme: PasswordScheme,
    entity: PhantomData<fn() -> E>,
}

impl<E: DirectoryEntity> EntityManager<E> {
    pub fn queries(&self) -> &QueryManager {
        &self.queries
    }

    /// DNs of the entries in `base`, windowed with `start..=end` unless both are 0
    pub async fn list(&self, base: &str, start: u32, end: u32) -> Result<Vec<String>> {
        let entries = self
            .queries
            .limited_search_kind(base, E::KIND, start, end)
            .await?;
        Ok(entries.into_iter().map(|entry| entry.dn).collect())
    }

    pub async fn list_entities(&self, base: &str, start: u32, end: u32) -> Result<Vec<E>> {
        let entries = self
            .queries
            .limited_search_kind(base, E::KIND, start, end)
            .await?;
        Ok(entries
            .iter()
            .map(|entry| E::from_attributes(&entry.dn, &entry.attrs))
            .collect())
    }

    pub async fn get(&self, dn: &str) -> Result<E> {
        let entry = self.queries.get_register(dn, E::READ_ATTRIBUTES).await?;
        Ok(E::from_attributes(&entry.dn, &entry.attrs))
    }

    pub async fn exists(&self, dn: &str) -> Result<bool> {
        match self.queries.get_register(dn, &["1.1"]).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Attributes to store, with the password hashed
    fn stored_attributes(&self, entity: &E) -> AttributeSet {
        let mut attrs = entity.to_attributes();
        let password_attribute = E::reconcile_policy().password_attribute;

        if let (Some(secret), Some(attribute)) = (entity.secret(), password_attribute) {
            if !secret.is_empty() {
                attrs.set(attribute, [hash_password(self.scheme, secret)]);
            }
        }
        attrs
    }

    fn check_entity(entity: &E) -> Result<()> {
        if entity.name().is_empty() {
            return Err(DirectoryError::WrongParameter(format!(
                "{} is required",
                E::NAMING_ATTRIBUTE
            )));
        }
        dn::check_naming(entity.dn(), E::NAMING_ATTRIBUTE, entity.name())?;
        Ok(())
    }

    pub async fn create(&self, entity: &E) -> Result<()> {
        Self::check_entity(entity)?;

        self.queries
            .add_entry(entity.dn(), &self.stored_attributes(entity))
            .await?;
        info!("Created {}", entity.dn());
        Ok(())
    }

    /// Writes the difference between `entity` and the stored entry
    pub async fn update(&self, entity: &E) -> Result<()> {
        Self::check_entity(entity)?;

        let current = match self
            .queries
            .get_register(entity.dn(), E::READ_ATTRIBUTES)
            .await
        {
            Ok(current) => current,
            Err(e) if e.is_not_found() => {
                return Err(DirectoryError::SourceNotFound(entity.dn().to_string()))
            }
            Err(e) => return Err(e),
        };

        let current = E::from_attributes(&current.dn, &current.attrs).to_attributes();
        let modifications = reconcile(
            &self.stored_attributes(entity),
            &current,
            &E::reconcile_policy(),
        );

        if modifications.is_empty() {
            debug!("{} is up to date", entity.dn());
            return Ok(());
        }

        self.queries.save_entry(entity.dn(), &modifications).await?;
        info!("Updated {}", entity.dn());
        Ok(())
    }

    /// Creates or updates the entry at `dn`
    pub async fn save(&self, dn: &str, mut entity: E) -> Result<SaveOutcome> {
        let name = dn::check_naming(dn, E::NAMING_ATTRIBUTE, entity.name())?;
        if !entity.dn().is_empty() && !entity.dn().eq_ignore_ascii_case(dn) {
            return Err(DirectoryError::WrongParameter(format!(
                "entity DN {} does not match {dn}",
                entity.dn()
            )));
        }

        entity.set_dn(dn.to_string());
        entity.set_name(name);

        if self.exists(dn).await? {
            self.update(&entity).await?;
            Ok(SaveOutcome::Updated)
        } else {
            self.create(&entity).await?;
            Ok(SaveOutcome::Created)
        }
    }

    pub async fn delete(&self, dn: &str) -> Result<()> {
        self.queries.delete_entry(dn).await?;
        info!("Deleted {dn}");
        Ok(())
    }
}

pub struct PeopleManager {
    entities: EntityManager<Person>,
    auth: Arc<AuthValidator>,
}

impl Deref for PeopleManager {
    type Target = EntityManager<Person>;

    fn deref(&self) -> &Self::Target {
        &self.entities
    }
}

impl PeopleManager {
    /// Free text search, restricted to people
    pub async fn search(&self, filter: &str) -> Result<Vec<Person>> {
        let entries = self.queries().search_people("", filter).await?;
        Ok(entries
            .iter()
            .map(|entry| Person::from_attributes(&entry.dn, &entry.attrs))
            .collect())
    }

    /// DNs of the groups listing `dn` as a member
    pub async fn member_of(&self, dn: &str) -> Result<Vec<String>> {
        let escaped = ldap_escape(dn);
        let filter = format!(
            "(&{}(|(member={escaped})(uniqueMember={escaped})))",
            SearchKind::Group.filter()
        );

        let entries = self.queries().search("", &filter).await?;
        Ok(entries.into_iter().map(|entry| entry.dn).collect())
    }

    /// People listed as members of the group. Members that no longer exist or
    /// are not people are skipped.
    pub async fn in_group(&self, group_dn: &str) -> Result<Vec<Person>> {
        let group = self
            .queries()
            .get_register(group_dn, Group::READ_ATTRIBUTES)
            .await?;
        let group = Group::from_attributes(&group.dn, &group.attrs);

        let mut people = Vec::with_capacity(group.members.len());
        for member in &group.members {
            match self.queries().get_register(member, Person::READ_ATTRIBUTES).await {
                Ok(entry) if entry.attrs.has_value("objectClass", "person") => {
                    people.push(Person::from_attributes(&entry.dn, &entry.attrs))
                }
                Ok(entry) => debug!("Member {} of {group_dn} is not a person", entry.dn),
                Err(e) if e.is_not_found() => warn!("Member {member} of {group_dn} is gone"),
                Err(e) => return Err(e),
            }
        }
        Ok(people)
    }

    /// Validates the credentials of an existing person
    pub async fn authenticate(&self, dn: &str, password: &str) -> Result<bool> {
        if !self.exists(dn).await? {
            return Err(DirectoryError::NotFound(dn.to_string()));
        }
        Ok(self.auth.validate(dn, password).await)
    }

    /// Validates credentials without looking the login up first
    pub async fn authenticate_direct(&self, login: &str, password: &str) -> bool {
        self.auth.validate(login, password).await
    }
}

pub struct UserManager {
    entities: EntityManager<User>,
    auth: Arc<AuthValidator>,
}

impl Deref for UserManager {
    type Target = EntityManager<User>;

    fn deref(&self) -> &Self::Target {
        &self.entities
    }
}

impl UserManager {
    pub async fn authenticate(&self, dn: &str, password: &str) -> Result<bool> {
        if !self.exists(dn).await? {
            return Err(DirectoryError::NotFound(dn.to_string()));
        }
        Ok(self.auth.validate(dn, password).await)
    }
}

pub struct GroupManager {
    entities: EntityManager<Group>,
}

impl Deref for GroupManager {
    type Target = EntityManager<Group>;

    fn deref(&self) -> &Self::Target {
        &self.entities
    }
}

impl GroupManager {
    pub async fn members(&self, dn: &str) -> Result<Vec<String>> {
        Ok(self.get(dn).await?.members)
    }

    pub async fn is_member(&self, dn: &str, member: &str) -> Result<bool> {
        Ok(self.get(dn).await?.has_member(member))
    }

    /// Replaces the member list, leaving the other attributes alone
    pub async fn set_members(&self, dn: &str, members: Vec<String>) -> Result<()> {
        let mut group = match self.get(dn).await {
            Ok(group) => group,
            Err(e) if e.is_not_found() => return Err(DirectoryError::SourceNotFound(dn.to_string())),
            Err(e) => return Err(e),
        };
        group.members = members;
        self.update(&group).await
    }
}
