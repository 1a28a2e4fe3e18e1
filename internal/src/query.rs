use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, error};

use crate::attrs::{AttributeSet, DirectoryEntry, Modification};
use crate::controls::{sort_control, vlv_control, SortKey, VirtualListView};
use crate::dn;
use crate::error::{DirectoryError, Result};
use crate::pool::{ConnectionPool, PoolKind, PooledConnection};
use crate::session::SearchRequest;
use crate::LdapConfig;

/// Predefined searches by entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    User,
    Person,
    Group,
    Ou,
    Machine,
}

impl SearchKind {
    pub fn filter(&self) -> &'static str {
        match self {
            SearchKind::User | SearchKind::Person => "(objectClass=person)",
            SearchKind::Group => "(|(objectClass=groupOfNames)(objectClass=groupOfUniqueNames))",
            SearchKind::Ou => "(objectClass=organizationalUnit)",
            SearchKind::Machine => "(objectClass=computer)",
        }
    }
}

/// 1-based, inclusive slice of a sorted result set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    pub start: u32,
    pub end: u32,
}

impl SearchWindow {
    /// `(0, 0)` asks for everything and yields `None`
    pub fn new(start: u32, end: u32) -> Result<Option<Self>> {
        match (start, end) {
            (0, 0) => Ok(None),
            (0, _) => Err(DirectoryError::WrongParameter(
                "a window has to start at 1 or later".to_string(),
            )),
            (start, end) if end < start => Err(DirectoryError::WrongParameter(format!(
                "window end {end} is before its start {start}"
            ))),
            (start, end) => Ok(Some(Self { start, end })),
        }
    }

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }
}

/// Rejects filters that are empty or whose parentheses do not balance
pub fn check_filter(filter: &str) -> Result<()> {
    let filter = filter.trim();
    if filter.is_empty() {
        return Err(DirectoryError::InvalidFilter("filter is empty".to_string()));
    }
    if !filter.starts_with('(') || !filter.ends_with(')') {
        return Err(DirectoryError::InvalidFilter(format!(
            "{filter} is not enclosed in parentheses"
        )));
    }

    let mut depth = 0usize;
    let mut previous = None;
    for c in filter.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                if previous == Some('(') {
                    return Err(DirectoryError::InvalidFilter(format!(
                        "{filter} contains an empty component"
                    )));
                }
                depth = depth.checked_sub(1).ok_or_else(|| {
                    DirectoryError::InvalidFilter(format!("unbalanced `)` in {filter}"))
                })?;
            }
            _ => {}
        }
        previous = Some(c);
    }

    if depth != 0 {
        return Err(DirectoryError::InvalidFilter(format!(
            "unbalanced `(` in {filter}"
        )));
    }
    Ok(())
}

/// Strips one pair of parentheses if it encloses the whole filter
fn strip_outer(filter: &str) -> &str {
    let filter = filter.trim();
    if !filter.starts_with('(') {
        return filter;
    }

    let mut depth = 0usize;
    for (index, c) in filter.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return if index == filter.len() - 1 {
                        &filter[1..index]
                    } else {
                        filter
                    };
                }
            }
            _ => {}
        }
    }
    filter
}

/// Restricts a caller supplied filter to person entries
pub fn person_filter(user_filter: &str) -> Result<String> {
    let inner = strip_outer(user_filter);
    if inner.is_empty() {
        return Err(DirectoryError::InvalidFilter("filter is empty".to_string()));
    }
    if inner.starts_with('(') {
        return Err(DirectoryError::InvalidFilter(format!(
            "{user_filter} is not a single filter"
        )));
    }

    let filter = format!("(&{}({inner}))", SearchKind::Person.filter());
    check_filter(&filter)?;
    Ok(filter)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryTimestamps {
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

/// Parses LDAP generalized time as written by 389ds
pub fn parse_generalized_time(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, "%Y%m%d%H%M%SZ")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y%m%d%H%M%S%.fZ"))
        .ok()
        .map(|time| time.and_utc())
}

/// Search, read and write executor on top of the connection pool
pub struct QueryManager {
    pool: Arc<ConnectionPool>,
    root_base: String,
    page_size: i32,
    max_results: i32,
    sort_attribute: String,
}

impl QueryManager {
    pub fn new(config: &LdapConfig, pool: Arc<ConnectionPool>) -> Self {
        Self {
            pool,
            root_base: config.default_base.clone(),
            page_size: config.page_size,
            max_results: config.max_results,
            sort_attribute: config.sort_attribute.clone(),
        }
    }

    pub fn root_base(&self) -> &str {
        &self.root_base
    }

    /// Full search base for a base relative to the root
    pub fn base(&self, relative: &str) -> String {
        dn::join_base(relative, &self.root_base)
    }

    fn release<T>(connection: &mut PooledConnection, result: &Result<T>) {
        if let Err(e) = result {
            if e.is_connection_broken() {
                connection.invalidate();
            }
        }
    }

    async fn run_search(&self, request: SearchRequest) -> Result<Vec<DirectoryEntry>> {
        let kind = if request.scope == crate::session::SearchScope::Base {
            PoolKind::Clean
        } else {
            PoolKind::Shared
        };

        let mut connection = self.pool.acquire(kind).await?;
        let start = Instant::now();
        let result = connection.session()?.search(&request).await;
        Self::release(&mut connection, &result);

        if let Ok(entries) = &result {
            debug!(
                "Search {} in {} returned {} entries in {:?}",
                request.filter,
                request.base,
                entries.len(),
                start.elapsed()
            );
        }
        result
    }

    pub async fn search(&self, base: &str, filter: &str) -> Result<Vec<DirectoryEntry>> {
        check_filter(filter)?;

        let mut request = SearchRequest::subtree(&self.base(base), filter);
        request.page_size = Some(self.page_size);
        request.size_limit = self.max_results;

        self.run_search(request).await
    }

    pub async fn search_kind(&self, base: &str, kind: SearchKind) -> Result<Vec<DirectoryEntry>> {
        self.search(base, kind.filter()).await
    }

    /// Free text search over person entries
    pub async fn search_people(&self, base: &str, user_filter: &str) -> Result<Vec<DirectoryEntry>> {
        self.search(base, &person_filter(user_filter)?).await
    }

    /// Entries `start..=end` of the result sorted on the configured attribute.
    /// `(0, 0)` falls back to an unbounded search.
    pub async fn limited_search(
        &self,
        base: &str,
        filter: &str,
        start: u32,
        end: u32,
    ) -> Result<Vec<DirectoryEntry>> {
        let Some(window) = SearchWindow::new(start, end)? else {
            return self.search(base, filter).await;
        };
        check_filter(filter)?;

        let mut request = SearchRequest::subtree(&self.base(base), filter);
        request.controls = vec![
            sort_control(&[SortKey::ascending(&self.sort_attribute)])?,
            vlv_control(&VirtualListView {
                before_count: 0,
                after_count: i64::from(window.end - window.start),
                offset: i64::from(window.start),
                content_count: i64::from(self.max_results),
            })?,
        ];

        let mut entries = self.run_search(request).await?;
        entries.truncate(window.len());
        Ok(entries)
    }

    pub async fn limited_search_kind(
        &self,
        base: &str,
        kind: SearchKind,
        start: u32,
        end: u32,
    ) -> Result<Vec<DirectoryEntry>> {
        self.limited_search(base, kind.filter(), start, end).await
    }

    /// Reads a single entry by DN
    pub async fn get_register(&self, dn: &str, attrs: &[&str]) -> Result<DirectoryEntry> {
        dn::parse(dn)?;

        let request = SearchRequest::base_object(dn, "(objectClass=*)", attrs);
        self.run_search(request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DirectoryError::NotFound(dn.to_string()))
    }

    pub async fn get_timestamps(&self, dn: &str) -> Result<EntryTimestamps> {
        let entry = self
            .get_register(dn, &["createTimestamp", "modifyTimestamp"])
            .await?;

        let parse = |name: &str| entry.attrs.first_str(name).and_then(parse_generalized_time);
        Ok(EntryTimestamps {
            created: parse("createTimestamp"),
            modified: parse("modifyTimestamp"),
        })
    }

    pub async fn add_entry(&self, dn: &str, attributes: &AttributeSet) -> Result<()> {
        dn::parse(dn)?;

        let mut connection = self.pool.acquire(PoolKind::Clean).await?;
        let result = connection.session()?.add(dn, attributes).await;
        Self::release(&mut connection, &result);

        match &result {
            Ok(()) => debug!("Added {dn}"),
            Err(e) => error!("Cannot add {dn}: {e}"),
        }
        result
    }

    pub async fn delete_entry(&self, dn: &str) -> Result<()> {
        dn::parse(dn)?;

        let mut connection = self.pool.acquire(PoolKind::Clean).await?;
        let result = connection.session()?.delete(dn).await;
        Self::release(&mut connection, &result);

        match &result {
            Ok(()) => debug!("Deleted {dn}"),
            Err(e) => error!("Cannot delete {dn}: {e}"),
        }
        result
    }

    /// Applies a modification list; an empty list never reaches the server
    pub async fn save_entry(&self, dn: &str, modifications: &[Modification]) -> Result<()> {
        if modifications.is_empty() {
            debug!("Nothing to save for {dn}");
            return Ok(());
        }
        dn::parse(dn)?;

        let mut connection = self.pool.acquire(PoolKind::Clean).await?;
        let result = connection.session()?.modify(dn, modifications).await;
        Self::release(&mut connection, &result);

        match &result {
            Ok(()) => debug!("Applied {} modifications to {dn}", modifications.len()),
            Err(e) => error!("Cannot modify {dn}: {e}"),
        }
        result
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::queries;
    use super::*;
    use crate::attrs::fixtures::entry;
    use crate::attrs::ModOperation;
    use crate::controls::{SORT_REQUEST_OID, VLV_REQUEST_OID};
    use crate::session::{MockDirectoryConnector, MockDirectorySession, SearchScope};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn unreachable() -> MockDirectoryConnector {
        let mut connector = MockDirectoryConnector::new();
        connector.expect_connect().times(0);
        connector
    }

    fn people(count: usize) -> Vec<DirectoryEntry> {
        (0..count)
            .map(|n| {
                entry(
                    &format!("cn=p{n},ou=people,dc=example,dc=com"),
                    &[("cn", &[&format!("p{n}")])],
                )
            })
            .collect()
    }

    #[test]
    fn windows() {
        assert_eq!(SearchWindow::new(0, 0).unwrap(), None);
        assert!(SearchWindow::new(0, 10).is_err());
        assert!(SearchWindow::new(5, 4).is_err());
        assert_eq!(SearchWindow::new(3, 3).unwrap().map(|w| w.len()), Some(1));
        assert_eq!(SearchWindow::new(1, 10).unwrap().map(|w| w.len()), Some(10));
    }

    #[test]
    fn filters_are_checked() {
        assert!(check_filter("(objectClass=person)").is_ok());
        assert!(check_filter("(&(cn=a*)(|(sn=b)(sn=c)))").is_ok());
        assert!(check_filter("").is_err());
        assert!(check_filter("cn=a").is_err());
        assert!(check_filter("(cn=a").is_err());
        assert!(check_filter("(cn=a))(").is_err());
        assert!(check_filter("(&())").is_err());
    }

    #[test]
    fn person_filters_are_normalized() {
        assert_eq!(
            person_filter("(cn=jo*)").unwrap(),
            "(&(objectClass=person)(cn=jo*))"
        );
        assert_eq!(
            person_filter("cn=jo*").unwrap(),
            "(&(objectClass=person)(cn=jo*))"
        );
        assert_eq!(
            person_filter("(|(cn=a)(cn=b))").unwrap(),
            "(&(objectClass=person)(|(cn=a)(cn=b)))"
        );
        assert!(person_filter("(cn=a)(cn=b)").is_err());
        assert!(person_filter("()").is_err());
    }

    #[test]
    fn generalized_time() {
        let time = parse_generalized_time("20240229123000Z").unwrap();
        assert_eq!(time.to_rfc3339(), "2024-02-29T12:30:00+00:00");
        assert!(parse_generalized_time("20240229123000.5Z").is_some());
        assert!(parse_generalized_time("yesterday").is_none());
    }

    #[tokio::test]
    async fn window_starting_at_zero_never_connects() {
        let queries = queries(unreachable());
        let result = queries
            .limited_search("ou=people", "(objectClass=person)", 0, 10)
            .await;
        assert!(matches!(result, Err(DirectoryError::WrongParameter(_))));
    }

    #[tokio::test]
    async fn malformed_filter_never_connects() {
        let queries = queries(unreachable());
        let result = queries.search("", "(cn=jdoe").await;
        assert!(matches!(result, Err(DirectoryError::InvalidFilter(_))));
    }

    #[tokio::test]
    async fn empty_modification_list_never_connects() {
        let queries = queries(unreachable());
        queries
            .save_entry("cn=jdoe,ou=people,dc=example,dc=com", &[])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn windowed_search_sends_sort_and_vlv() {
        let mut connector = MockDirectoryConnector::new();
        connector.expect_connect().times(2).returning(|_| {
            let mut session = MockDirectorySession::new();
            session.expect_bind().returning(|_, _| Ok(()));
            session.expect_is_connected().return_const(true);
            session
                .expect_search()
                .withf(|request| {
                    request.base == "ou=people,dc=example,dc=com"
                        && request.page_size.is_none()
                        && request.controls.len() == 2
                        && request.controls[0].ctype == SORT_REQUEST_OID
                        && request.controls[1].ctype == VLV_REQUEST_OID
                })
                .returning(|_| Ok(people(8)));
            Ok(Box::new(session))
        });

        let queries = queries(connector);
        let entries = queries
            .limited_search_kind("ou=people", SearchKind::Person, 2, 6)
            .await
            .unwrap();
        assert_eq!(entries.len(), 5);
    }

    #[tokio::test]
    async fn plain_search_pages_without_controls() {
        let mut connector = MockDirectoryConnector::new();
        connector.expect_connect().times(2).returning(|_| {
            let mut session = MockDirectorySession::new();
            session.expect_bind().returning(|_, _| Ok(()));
            session.expect_is_connected().return_const(true);
            session
                .expect_search()
                .withf(|request| {
                    request.base == "dc=example,dc=com"
                        && request.scope == SearchScope::Subtree
                        && request.page_size == Some(999)
                        && request.size_limit == 100
                        && request.controls.is_empty()
                })
                .returning(|_| Ok(people(3)));
            Ok(Box::new(session))
        });

        let queries = queries(connector);
        let entries = queries.limited_search("", "(cn=*)", 0, 0).await.unwrap();
        assert_eq!(entries.len(), 3);
    }

    #[tokio::test]
    async fn missing_register_is_not_found() {
        let mut connector = MockDirectoryConnector::new();
        connector.expect_connect().times(2).returning(|_| {
            let mut session = MockDirectorySession::new();
            session.expect_bind().returning(|_, _| Ok(()));
            session.expect_is_connected().return_const(true);
            session
                .expect_search()
                .withf(|request| request.scope == SearchScope::Base)
                .returning(|request| Err(DirectoryError::NotFound(request.base.clone())));
            Ok(Box::new(session))
        });

        let queries = queries(connector);
        let result = queries
            .get_register("cn=ghost,ou=people,dc=example,dc=com", &["*"])
            .await;
        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn reads_timestamps() {
        let mut connector = MockDirectoryConnector::new();
        connector.expect_connect().times(2).returning(|_| {
            let mut session = MockDirectorySession::new();
            session.expect_bind().returning(|_, _| Ok(()));
            session.expect_is_connected().return_const(true);
            session.expect_search().returning(|request| {
                Ok(vec![entry(
                    &request.base,
                    &[
                        ("createTimestamp", &["20230101000000Z"]),
                        ("modifyTimestamp", &["20240615083000Z"]),
                    ],
                )])
            });
            Ok(Box::new(session))
        });

        let queries = queries(connector);
        let timestamps = queries
            .get_timestamps("cn=jdoe,ou=people,dc=example,dc=com")
            .await
            .unwrap();
        assert!(timestamps.created < timestamps.modified);
        assert_eq!(
            timestamps.modified.map(|t| t.to_rfc3339()),
            Some("2024-06-15T08:30:00+00:00".to_string())
        );
    }

    #[tokio::test]
    async fn broken_connection_is_replaced() {
        let connects = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicBool::new(false));
        let counter = connects.clone();

        let mut connector = MockDirectoryConnector::new();
        connector.expect_connect().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            let failed = failed.clone();
            let mut session = MockDirectorySession::new();
            session.expect_bind().returning(|_, _| Ok(()));
            session.expect_is_connected().return_const(true);
            session.expect_modify().returning(move |_, _| {
                if failed.swap(true, Ordering::SeqCst) {
                    Ok(())
                } else {
                    Err(DirectoryError::Transport("connection reset".to_string()))
                }
            });
            Ok(Box::new(session))
        });

        let queries = queries(connector);
        let dn = "cn=jdoe,ou=people,dc=example,dc=com";
        let modifications = vec![Modification::new(
            ModOperation::Replace,
            "description",
            vec![b"moved".to_vec()],
        )];

        assert!(queries.save_entry(dn, &modifications).await.is_err());
        assert_eq!(connects.load(Ordering::SeqCst), 2);

        queries.save_entry(dn, &modifications).await.unwrap();
        assert_eq!(connects.load(Ordering::SeqCst), 3);
    }
}
