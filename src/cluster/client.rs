//! Cluster-aware client.
//!
//! The client starts as a plain single-node connection and migrates into
//! cluster mode the first time a server answers with a redirect. From then
//! on every request is routed by the hash slot of its first key against an
//! immutable slot-map snapshot, republished atomically whenever the
//! topology moves.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::Rng;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::cluster::slot::SLOT_COUNT;
use crate::cluster::topology;
use crate::core::connection::{Connection, ConnectionConfig};
use crate::core::dialer::TcpDialer;
use crate::core::request::Request;
use crate::proto::error::{Error, Result};
use crate::proto::frame::Reply;
use crate::proto::value::Value;

/// Configuration for a [`Client`].
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientConfig {
    /// Attempts before a redirected request gives up.
    pub max_redirections: u32,
    /// `MOVED` replies tolerated as single-slot patches before a full
    /// `CLUSTER SLOTS` refresh.
    pub max_slot_updates: u32,
    /// Settings inherited by every node connection.
    pub connection: ConnectionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_redirections: 16,
            max_slot_updates: 4,
            connection: ConnectionConfig::default(),
        }
    }
}

/// One immutable routing snapshot: every slot resolved to a connection
/// handle. Never mutated after publication; updates build and publish a
/// fresh snapshot.
struct SlotMap {
    id: i64,
    sharded: bool,
    missed: u32,
    slots: Vec<Option<Arc<Connection>>>,
    nodes: HashMap<String, Arc<Connection>>,
}

#[derive(Default)]
struct NodeTable {
    nodes: HashMap<String, Arc<Connection>>,
}

/// A client to one server or a sharded cluster of servers.
///
/// Created from one or more seed addresses. The first address serves all
/// traffic until a `MOVED`/`ASK` reply arrives, at which point the client
/// discovers the slot layout with `CLUSTER SLOTS` and routes per key from
/// then on, tolerating topology changes as it goes.
///
/// The client owns every node connection; [`close`](Client::close) shuts
/// each one down exactly once.
pub struct Client {
    addresses: Vec<String>,
    config: ClientConfig,
    state: RwLock<Option<Arc<SlotMap>>>,
    // Reconfiguration lock: serializes migrate/update/redirect/random/
    // reconfigure and guards the client-wide node table. Request sends
    // never take it.
    sync: Mutex<NodeTable>,
    closed: AtomicBool,
}

impl Client {
    /// Creates a client over the given seed addresses (`host:port`, an
    /// optional `tcp://` or `redis://` scheme is stripped). An empty list
    /// falls back to `localhost:6379`. No connection is opened until the
    /// first send.
    pub fn new(addresses: Vec<String>, config: ClientConfig) -> Self {
        let mut addresses: Vec<String> = addresses
            .into_iter()
            .map(|a| TcpDialer::new(a).addr().to_string())
            .collect();
        if addresses.is_empty() {
            addresses.push("localhost:6379".to_string());
        }

        Self {
            addresses,
            config,
            state: RwLock::new(None),
            sync: Mutex::new(NodeTable::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// Executes a single command and returns its reply.
    pub async fn exec(&self, name: &str, args: Vec<Value>) -> Result<Reply> {
        let request = self.send(Request::new(name, args)).await?;
        request.into_last_result()
    }

    /// Sends a request, routing by the first command's key and following
    /// redirects up to [`max_redirections`](ClientConfig::max_redirections)
    /// times.
    ///
    /// The returned request carries per-command outcomes; when redirects
    /// were exhausted it carries the last error. `Err` is only returned
    /// when the client is closed or a topology refresh failed outright.
    pub async fn send(&self, mut request: Request) -> Result<Request> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }

        let mut state = match self.snapshot().await {
            Some(state) => state,
            None => self.initialize().await,
        };

        let mut slot: u16 = if state.sharded { request.slot() } else { 0 };
        let mut node = state.slots[slot as usize].clone();

        for _ in 0..self.config.max_redirections {
            let conn = match node.take() {
                Some(conn) => conn,
                None => match self.random().await {
                    Some(conn) => conn,
                    None => return Err(Error::Closed),
                },
            };

            request = conn.send(request).await?;
            if !request.redirect() {
                return Ok(request);
            }

            let addr = request.redirect_addr().to_string();
            debug!(moved = request.moved(), %addr, "request redirected");

            // first redirect ever: become a cluster client
            if !state.sharded {
                state = self.migrate(&state).await?;
                slot = request.slot();
                node = state.slots[slot as usize].clone();
                continue;
            }

            if let Some(known) = state.nodes.get(&addr).cloned() {
                if request.moved() {
                    match self.update(slot, known.clone()).await {
                        Ok(next) => state = next,
                        Err(err) => {
                            warn!(error = %err, "slot update failed");
                            node = self.random().await;
                            continue;
                        }
                    }
                }
                node = Some(known);
                continue;
            }

            match self.redirect(&addr).await {
                Ok((next, conn)) => {
                    state = next;
                    node = Some(conn);
                }
                Err(err) => {
                    warn!(error = %err, %addr, "redirect failed");
                    node = self.random().await;
                }
            }
        }

        // redirections exhausted: the request carries the last error
        Ok(request)
    }

    /// Closes every node connection. Idempotent; sends after this return
    /// [`Error::Closed`].
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let nodes = {
            let mut table = self.sync.lock().await;
            std::mem::take(&mut table.nodes)
        };
        for (_, conn) in nodes {
            conn.close().await;
        }
    }

    async fn snapshot(&self) -> Option<Arc<SlotMap>> {
        self.state.read().await.clone()
    }

    async fn publish(&self, state: Arc<SlotMap>) {
        *self.state.write().await = Some(state);
    }

    fn connect(&self, addr: &str) -> Arc<Connection> {
        Arc::new(Connection::new(
            TcpDialer::new(addr),
            self.config.connection.clone(),
        ))
    }

    /// First-send setup: one unopened connection per seed, every slot
    /// pointing at the first seed, not yet sharded.
    async fn initialize(&self) -> Arc<SlotMap> {
        let mut table = self.sync.lock().await;
        if let Some(state) = self.snapshot().await {
            return state;
        }

        for addr in &self.addresses {
            if !table.nodes.contains_key(addr) {
                let conn = self.connect(addr);
                table.nodes.insert(addr.clone(), conn);
            }
        }
        let primary = table
            .nodes
            .get(&self.addresses[0])
            .cloned()
            .unwrap_or_else(|| self.connect(&self.addresses[0]));

        let state = Arc::new(SlotMap {
            id: 0,
            sharded: false,
            missed: 0,
            slots: vec![Some(primary); SLOT_COUNT as usize],
            nodes: table.nodes.clone(),
        });
        self.publish(state.clone()).await;
        state
    }

    /// Migrates from single-node to cluster mode by discovering the slot
    /// layout from the node that answered last.
    async fn migrate(&self, last: &Arc<SlotMap>) -> Result<Arc<SlotMap>> {
        let mut table = self.sync.lock().await;

        // double-check for a racing migration
        if let Some(state) = self.snapshot().await {
            if state.sharded {
                return Ok(state);
            }
        }

        let seed = last.slots[0].clone().ok_or(Error::Closed)?;
        self.reconfigure(&mut table, last, seed).await
    }

    /// Patches a single slot, or refreshes the whole layout once too many
    /// `MOVED` replies piled up.
    async fn update(&self, slot: u16, node: Arc<Connection>) -> Result<Arc<SlotMap>> {
        let mut table = self.sync.lock().await;
        let state = match self.snapshot().await {
            Some(state) => state,
            None => return Err(Error::Closed),
        };

        if state.missed + 1 < self.config.max_slot_updates {
            let mut slots = state.slots.clone();
            slots[slot as usize] = Some(node);
            let next = Arc::new(SlotMap {
                id: state.id + 1,
                sharded: true,
                missed: state.missed + 1,
                slots,
                nodes: state.nodes.clone(),
            });
            self.publish(next.clone()).await;
            debug!(id = next.id, slot, "slot map patched");
            return Ok(next);
        }

        self.reconfigure(&mut table, &state, node).await
    }

    /// Handles a redirect to an address without a connection yet: opens
    /// one and refreshes the layout through it.
    async fn redirect(&self, addr: &str) -> Result<(Arc<SlotMap>, Arc<Connection>)> {
        let mut table = self.sync.lock().await;
        let state = match self.snapshot().await {
            Some(state) => state,
            None => return Err(Error::Closed),
        };

        // connected meanwhile?
        if let Some(conn) = state.nodes.get(addr) {
            return Ok((state.clone(), conn.clone()));
        }

        let conn = self.connect(addr);
        // registered immediately so close() reaches it even if the
        // CLUSTER SLOTS reply does not list it
        table.nodes.insert(addr.to_string(), conn.clone());

        let next = self.reconfigure(&mut table, &state, conn.clone()).await?;
        Ok((next, conn))
    }

    /// Falls back to a random known node.
    async fn random(&self) -> Option<Arc<Connection>> {
        let table = self.sync.lock().await;
        if table.nodes.is_empty() {
            return None;
        }
        let n = rand::thread_rng().gen_range(0..table.nodes.len());
        table.nodes.values().nth(n).cloned()
    }

    /// Issues `CLUSTER SLOTS` to `node` and publishes a fresh snapshot,
    /// reusing existing connections by address and dialing new ones.
    ///
    /// Caller holds the reconfiguration lock.
    async fn reconfigure(
        &self,
        table: &mut NodeTable,
        last: &SlotMap,
        node: Arc<Connection>,
    ) -> Result<Arc<SlotMap>> {
        let reply = node.exec("CLUSTER", vec!["SLOTS".into()]).await?;
        let ranges = topology::parse_slots(&reply)?;

        let mut nodes: HashMap<String, Arc<Connection>> = HashMap::new();
        let mut slots: Vec<Option<Arc<Connection>>> = vec![None; SLOT_COUNT as usize];

        for range in &ranges {
            let conn = match nodes.get(&range.addr) {
                Some(conn) => conn.clone(),
                None => {
                    let conn = last
                        .nodes
                        .get(&range.addr)
                        .or_else(|| table.nodes.get(&range.addr))
                        .cloned()
                        .unwrap_or_else(|| self.connect(&range.addr));
                    nodes.insert(range.addr.clone(), conn.clone());
                    conn
                }
            };
            for slot in range.start..=range.end {
                slots[slot as usize] = Some(conn.clone());
            }
        }

        // every connection the snapshot references is owned by the client
        for (addr, conn) in &nodes {
            table
                .nodes
                .entry(addr.clone())
                .or_insert_with(|| conn.clone());
        }

        let next = Arc::new(SlotMap {
            id: last.id + 1,
            sharded: true,
            missed: 0,
            slots,
            nodes,
        });
        self.publish(next.clone()).await;
        debug!(
            id = next.id,
            nodes = next.nodes.len(),
            ranges = ranges.len(),
            "slot map reconfigured"
        );
        Ok(next)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("addresses", &self.addresses)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.max_redirections, 16);
        assert_eq!(config.max_slot_updates, 4);
        assert_eq!(config.connection.max_pending_requests, 1000);
    }

    #[test]
    fn test_new_strips_schemes() {
        let client = Client::new(
            vec![
                "tcp://127.0.0.1:7000".to_string(),
                "redis://127.0.0.1:7001".to_string(),
            ],
            ClientConfig::default(),
        );
        assert_eq!(client.addresses, vec!["127.0.0.1:7000", "127.0.0.1:7001"]);
    }

    #[test]
    fn test_new_defaults_to_localhost() {
        let client = Client::new(Vec::new(), ClientConfig::default());
        assert_eq!(client.addresses, vec!["localhost:6379"]);
    }

    #[tokio::test]
    async fn test_initialize_publishes_unsharded_map() {
        let client = Client::new(
            vec!["127.0.0.1:7000".to_string(), "127.0.0.1:7001".to_string()],
            ClientConfig::default(),
        );

        let state = client.initialize().await;
        assert!(!state.sharded);
        assert_eq!(state.id, 0);
        assert_eq!(state.slots.len(), SLOT_COUNT as usize);
        assert_eq!(state.nodes.len(), 2);

        // every slot points at the first seed
        let first = state.slots[0].as_ref().map(Arc::as_ptr);
        assert!(state.slots.iter().all(|s| s.as_ref().map(Arc::as_ptr) == first));

        // racing initialization returns the published snapshot
        let again = client.initialize().await;
        assert_eq!(again.id, state.id);
    }

    #[tokio::test]
    async fn test_send_after_close() {
        let client = Client::new(vec!["127.0.0.1:7000".to_string()], ClientConfig::default());
        client.close().await;
        let err = client
            .exec("PING", Vec::new())
            .await
            .expect_err("closed client must refuse");
        assert!(matches!(err, Error::Closed));
    }
}
