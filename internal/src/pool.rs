use std::fmt;
use std::sync::Arc;

use rand::{seq::SliceRandom, Rng};
use tokio::sync::{Mutex, OnceCell, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::error::{DirectoryError, Result};
use crate::session::{DirectoryConnector, DirectorySession};
use crate::{Bind, DirectoryServer, LdapConfig};

/// Searches run on `Shared` connections, reads by DN and writes on `Clean`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Shared,
    Clean,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PoolKind::Shared => "shared",
            PoolKind::Clean => "clean",
        })
    }
}

/// Picks servers to connect to and slots to hand out
pub trait SelectionStrategy: Send + Sync {
    /// Order in which servers are tried, a permutation of `0..servers`
    fn server_order(&self, servers: usize) -> Vec<usize>;

    /// Slot to hand out, `slots` is never 0
    fn pick_slot(&self, slots: usize) -> usize;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSelection;

impl SelectionStrategy for RandomSelection {
    fn server_order(&self, servers: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..servers).collect();
        order.shuffle(&mut rand::thread_rng());
        order
    }

    fn pick_slot(&self, slots: usize) -> usize {
        rand::thread_rng().gen_range(0..slots)
    }
}

/// Opens a session on the first server, in strategy order, that accepts the
/// connection
pub(crate) async fn open_session(
    connector: &dyn DirectoryConnector,
    servers: &[DirectoryServer],
    strategy: &dyn SelectionStrategy,
) -> Result<(Box<dyn DirectorySession>, DirectoryServer)> {
    let mut failures = Vec::new();

    for index in strategy.server_order(servers.len()) {
        let Some(server) = servers.get(index) else {
            continue;
        };

        match connector.connect(server).await {
            Ok(session) => return Ok((session, server.clone())),
            Err(e) => {
                warn!("Cannot connect to {server}: {e}");
                failures.push(e.to_string());
            }
        }
    }

    if failures.is_empty() {
        return Err(DirectoryError::ConnectFailure(
            "no server configured".to_string(),
        ));
    }
    Err(DirectoryError::ConnectFailure(failures.join("; ")))
}

#[derive(Default)]
struct Slot {
    session: Option<Box<dyn DirectorySession>>,
    server: Option<DirectoryServer>,
}

impl Slot {
    fn clear(&mut self) {
        self.session = None;
        self.server = None;
    }
}

struct Pools {
    shared: Vec<Arc<Mutex<Slot>>>,
    clean: Vec<Arc<Mutex<Slot>>>,
}

/// Two fixed-size pools of service-bound sessions.
///
/// Both pools are filled together on the first acquisition. Every slot sits
/// behind its own mutex: the caller holding a [`PooledConnection`] is the only
/// one driving that session until it is dropped.
pub struct ConnectionPool {
    connector: Arc<dyn DirectoryConnector>,
    strategy: Arc<dyn SelectionStrategy>,
    servers: Vec<DirectoryServer>,
    bind: Option<Bind>,
    size: usize,
    pools: OnceCell<Pools>,
}

impl ConnectionPool {
    pub fn new(
        config: &LdapConfig,
        connector: Arc<dyn DirectoryConnector>,
        strategy: Arc<dyn SelectionStrategy>,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            connector,
            strategy,
            servers: config.servers.clone(),
            bind: config.bind.clone(),
            size: config.pool_size,
            pools: OnceCell::new(),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_initialized(&self) -> bool {
        self.pools.initialized()
    }

    async fn pools(&self) -> Result<&Pools> {
        self.pools.get_or_try_init(|| self.fill()).await
    }

    async fn fill(&self) -> Result<Pools> {
        info!(
            "Opening {} connections per pool to {} server(s)",
            self.size,
            self.servers.len()
        );

        let mut shared = Vec::with_capacity(self.size);
        let mut clean = Vec::with_capacity(self.size);
        for _ in 0..self.size {
            shared.push(Arc::new(Mutex::new(self.new_slot().await?)));
        }
        for _ in 0..self.size {
            clean.push(Arc::new(Mutex::new(self.new_slot().await?)));
        }

        Ok(Pools { shared, clean })
    }

    async fn new_slot(&self) -> Result<Slot> {
        match self.open_bound().await {
            Ok((session, server)) => Ok(Slot {
                session: Some(session),
                server: Some(server),
            }),
            Err(e @ DirectoryError::BindFailure { .. }) => Err(e),
            Err(e) => {
                warn!("Pool slot left empty: {e}");
                Ok(Slot::default())
            }
        }
    }

    /// Connects and binds with the service identity, anonymous without one
    async fn open_bound(&self) -> Result<(Box<dyn DirectorySession>, DirectoryServer)> {
        let (mut session, server) =
            open_session(self.connector.as_ref(), &self.servers, self.strategy.as_ref()).await?;

        if let Some(bind) = &self.bind {
            if let Err(e) = session.bind(&bind.dn, &bind.pass).await {
                error!("Service bind as {} on {server} failed: {e}", bind.dn);
                return Err(e);
            }
        }

        Ok((session, server))
    }

    /// Hands out a connected and bound session of the given pool.
    ///
    /// A slot that is empty or whose connection dropped is reconnected in
    /// place. When that fails the slot stays empty and the error is returned.
    pub async fn acquire(&self, kind: PoolKind) -> Result<PooledConnection> {
        let pools = self.pools().await?;
        let slots = match kind {
            PoolKind::Shared => &pools.shared,
            PoolKind::Clean => &pools.clean,
        };

        let index = self.strategy.pick_slot(slots.len()) % slots.len();
        let mut guard = slots[index].clone().lock_owned().await;

        let healthy = guard
            .session
            .as_mut()
            .is_some_and(|session| session.is_connected());

        if !healthy {
            guard.clear();
            debug!("Reconnecting {kind} slot {index}");
            let (session, server) = self.open_bound().await?;
            guard.session = Some(session);
            guard.server = Some(server);
        }

        Ok(PooledConnection { guard, kind, index })
    }
}

/// Exclusive use of one pool slot, released on drop
pub struct PooledConnection {
    guard: OwnedMutexGuard<Slot>,
    kind: PoolKind,
    index: usize,
}

impl PooledConnection {
    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    pub fn server(&self) -> Option<&DirectoryServer> {
        self.guard.server.as_ref()
    }

    pub fn session(&mut self) -> Result<&mut (dyn DirectorySession + 'static)> {
        self.guard.session.as_deref_mut().ok_or_else(|| {
            DirectoryError::Transport(format!(
                "{} slot {} was invalidated",
                self.kind, self.index
            ))
        })
    }

    /// Empties the slot so that the next acquisition reconnects it
    pub fn invalidate(&mut self) {
        warn!("Dropping broken {} connection of slot {}", self.kind, self.index);
        self.guard.clear();
    }
}
