use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{
    adapters::{Adapter, EntriesOnly, PagedResults},
    controls::RawControl,
    DerefAliases, Ldap, LdapConnAsync, LdapConnSettings, Mod, Scope, SearchEntry, SearchOptions,
};
use tracing::{debug, error, warn};

use crate::attrs::{AttributeSet, DirectoryEntry, ModOperation, Modification};
use crate::error::{
    DirectoryError, Result, RC_NO_SUCH_OBJECT, RC_REFERRAL, RC_SIZE_LIMIT_EXCEEDED, RC_SUCCESS,
};
use crate::{DirectoryServer, LdapConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Base,
    OneLevel,
    Subtree,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub base: String,
    pub scope: SearchScope,
    pub filter: String,
    pub attrs: Vec<String>,
    /// 0 leaves the limit to the server
    pub size_limit: i32,
    /// Page through the results with the paged results control
    pub page_size: Option<i32>,
    /// Controls attached to this search only
    pub controls: Vec<RawControl>,
}

impl SearchRequest {
    pub fn subtree(base: &str, filter: &str) -> Self {
        Self {
            base: base.to_string(),
            scope: SearchScope::Subtree,
            filter: filter.to_string(),
            attrs: Vec::new(),
            size_limit: 0,
            page_size: None,
            controls: Vec::new(),
        }
    }

    pub fn base_object(dn: &str, filter: &str, attrs: &[&str]) -> Self {
        Self {
            scope: SearchScope::Base,
            attrs: attrs.iter().map(|attr| attr.to_string()).collect(),
            ..Self::subtree(dn, filter)
        }
    }

    pub fn with_attrs(mut self, attrs: &[&str]) -> Self {
        self.attrs = attrs.iter().map(|attr| attr.to_string()).collect();
        self
    }
}

/// One authenticated protocol session
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectorySession: Send {
    /// `false` once the underlying connection is known to be gone
    fn is_connected(&mut self) -> bool;

    async fn bind(&mut self, dn: &str, password: &str) -> Result<()>;

    /// Drains the whole result cursor
    async fn search(&mut self, request: &SearchRequest) -> Result<Vec<DirectoryEntry>>;

    async fn add(&mut self, dn: &str, attributes: &AttributeSet) -> Result<()>;

    async fn delete(&mut self, dn: &str) -> Result<()>;

    async fn modify(&mut self, dn: &str, modifications: &[Modification]) -> Result<()>;

    async fn unbind(&mut self) -> Result<()>;
}

/// Opens unauthenticated sessions to a given server
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    async fn connect(&self, server: &DirectoryServer) -> Result<Box<dyn DirectorySession>>;
}

#[derive(Debug, Clone)]
pub struct LdapConnector {
    tls: bool,
    verify_certs: bool,
    connect_timeout: Option<Duration>,
}

impl LdapConnector {
    pub fn new(config: &LdapConfig) -> Self {
        Self {
            tls: config.tls,
            verify_certs: config.verify_certs,
            connect_timeout: config.connect_timeout(),
        }
    }
}

#[async_trait]
impl DirectoryConnector for LdapConnector {
    async fn connect(&self, server: &DirectoryServer) -> Result<Box<dyn DirectorySession>> {
        let mut settings = LdapConnSettings::new().set_no_tls_verify(!self.verify_certs);
        if let Some(timeout) = self.connect_timeout {
            settings = settings.set_conn_timeout(timeout);
        }

        let url = server.url(self.tls);
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| DirectoryError::ConnectFailure(format!("{url}: {e}")))?;
        ldap3::drive!(conn);

        debug!("Connected to {url}");
        Ok(Box::new(LdapSession { ldap, url }))
    }
}

/// `ldap3` backed session
pub struct LdapSession {
    ldap: Ldap,
    url: String,
}

impl LdapSession {
    fn check(&self, dn: &str, rc: u32, text: &str) -> Result<()> {
        if rc == RC_SUCCESS {
            Ok(())
        } else {
            Err(DirectoryError::from_result(dn, rc, text))
        }
    }
}

fn to_mod(modification: &Modification) -> Mod<Vec<u8>> {
    let name = modification.attribute.as_bytes().to_vec();
    let values: HashSet<Vec<u8>> = modification.values.iter().cloned().collect();
    match modification.operation {
        ModOperation::Add => Mod::Add(name, values),
        ModOperation::Delete => Mod::Delete(name, values),
        ModOperation::Replace => Mod::Replace(name, values),
    }
}

/// Maps the final result code of a drained search. A size limit hit keeps
/// what was collected so far.
fn search_outcome(
    base: &str,
    rc: u32,
    text: &str,
    entries: Vec<DirectoryEntry>,
) -> Result<Vec<DirectoryEntry>> {
    match rc {
        RC_SUCCESS | RC_REFERRAL => Ok(entries),
        RC_SIZE_LIMIT_EXCEEDED => {
            warn!(
                "Search of {base} hit the size limit, returning the first {} entries",
                entries.len()
            );
            Ok(entries)
        }
        RC_NO_SUCH_OBJECT if entries.is_empty() => Err(DirectoryError::NotFound(base.to_string())),
        rc => {
            error!(
                "Search of {base} ended with rc={rc} after {} entries: {text}",
                entries.len()
            );
            Err(DirectoryError::SearchAborted {
                entries,
                reason: format!("rc={rc}: {text}"),
            })
        }
    }
}

#[async_trait]
impl DirectorySession for LdapSession {
    fn is_connected(&mut self) -> bool {
        !self.ldap.is_closed()
    }

    async fn bind(&mut self, dn: &str, password: &str) -> Result<()> {
        let result = self.ldap.simple_bind(dn, password).await?;
        if result.rc != RC_SUCCESS {
            return Err(DirectoryError::BindFailure {
                dn: dn.to_string(),
                rc: result.rc,
                reason: result.text,
            });
        }
        Ok(())
    }

    async fn search(&mut self, request: &SearchRequest) -> Result<Vec<DirectoryEntry>> {
        let mut adapters: Vec<Box<dyn Adapter<_, _>>> = vec![Box::new(EntriesOnly::new())];
        if let Some(page_size) = request.page_size {
            adapters.push(Box::new(PagedResults::new(page_size)));
        }

        if !request.controls.is_empty() {
            self.ldap.with_controls(request.controls.clone());
        }
        self.ldap.with_search_options(
            SearchOptions::new()
                .sizelimit(request.size_limit)
                .deref(DerefAliases::Never),
        );

        let mut stream = self
            .ldap
            .streaming_search_with(
                adapters,
                &request.base,
                request.scope.into(),
                &request.filter,
                request.attrs.clone(),
            )
            .await?;

        let mut entries = Vec::new();
        loop {
            match stream.next().await {
                Ok(Some(entry)) => entries.push(DirectoryEntry::from(SearchEntry::construct(entry))),
                Ok(None) => break,
                Err(e) => {
                    error!(
                        "Search of {} on {} aborted after {} entries: {e}",
                        request.base,
                        self.url,
                        entries.len()
                    );
                    return Err(DirectoryError::SearchAborted {
                        entries,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let result = stream.finish().await;
        search_outcome(&request.base, result.rc, &result.text, entries)
    }

    async fn add(&mut self, dn: &str, attributes: &AttributeSet) -> Result<()> {
        // the protocol rejects attributes without values
        let attrs: Vec<(Vec<u8>, HashSet<Vec<u8>>)> = attributes
            .iter()
            .filter(|attr| !attr.values.is_empty())
            .map(|attr| {
                (
                    attr.name.as_bytes().to_vec(),
                    attr.values.iter().cloned().collect(),
                )
            })
            .collect();

        let result = self.ldap.add(dn, attrs).await?;
        self.check(dn, result.rc, &result.text)
    }

    async fn delete(&mut self, dn: &str) -> Result<()> {
        let result = self.ldap.delete(dn).await?;
        self.check(dn, result.rc, &result.text)
    }

    async fn modify(&mut self, dn: &str, modifications: &[Modification]) -> Result<()> {
        let mods = modifications.iter().map(to_mod).collect();
        let result = self.ldap.modify(dn, mods).await?;
        self.check(dn, result.rc, &result.text)
    }

    async fn unbind(&mut self) -> Result<()> {
        self.ldap.unbind().await?;
        Ok(())
    }
}
