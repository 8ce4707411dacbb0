//! In-process coordination service
//!
//! `MemoryCoordination` keeps a node tree with persistent and ephemeral
//! nodes, sessions, one-shot deletion watches and session listeners. Every
//! connected `MemoryClient` behaves like one process's coordination client.
//!
//! Notifications are delivered in order on a dedicated notifier thread, so
//! callbacks never run on the thread that caused them. `settle()` blocks
//! until every queued notification (including ones queued by callbacks) has
//! been delivered.
//!
//! Fault injection: `expire_session`, `kill`, `drop_node`,
//! `notify_new_session`, `fail_session_establishment`, `set_unavailable`.

use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use super::client::{
    CoordinationClient, ListenerId, NodeEvent, NodeWatcher, SessionListener, SessionState,
    WatchId,
};
use super::errors::{CoordinationError, CoordinationResult};
use super::paths;

type ClientId = u64;
type Job = Box<dyn FnOnce() + Send>;

struct Node {
    data: Vec<u8>,
    owner: Option<(ClientId, u64)>,
}

struct Watch {
    path: String,
    client: ClientId,
    watcher: NodeWatcher,
}

struct Listener {
    client: ClientId,
    listener: Arc<dyn SessionListener>,
}

#[derive(Default)]
struct Session {
    generation: u64,
    closed: bool,
    unavailable: bool,
}

#[derive(Default)]
struct Tree {
    nodes: BTreeMap<String, Node>,
    watches: HashMap<WatchId, Watch>,
    listeners: HashMap<ListenerId, Listener>,
    sessions: HashMap<ClientId, Session>,
    next_id: u64,
}

impl Tree {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn node_exists(&self, path: &str) -> bool {
        path == "/" || self.nodes.contains_key(path)
    }

    fn check_session(&self, client: ClientId) -> CoordinationResult<u64> {
        match self.sessions.get(&client) {
            None => Err(CoordinationError::Closed),
            Some(session) if session.closed => Err(CoordinationError::Closed),
            Some(session) if session.unavailable => Err(CoordinationError::Unavailable(
                "connection to coordination service lost".to_string(),
            )),
            Some(session) => Ok(session.generation),
        }
    }

    fn child_names(&self, path: &str) -> Vec<String> {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path)
        };
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| !key[prefix.len()..].contains('/'))
            .map(|(key, _)| key[prefix.len()..].to_string())
            .collect()
    }

    /// Take every watch registered on `path`.
    fn take_watches(&mut self, path: &str) -> Vec<NodeWatcher> {
        let ids: Vec<WatchId> = self
            .watches
            .iter()
            .filter(|(_, w)| w.path == path)
            .map(|(id, _)| *id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.watches.remove(&id))
            .map(|w| w.watcher)
            .collect()
    }

    fn listeners_of(&self, client: ClientId) -> Vec<Arc<dyn SessionListener>> {
        let mut entries: Vec<(&ListenerId, &Listener)> = self
            .listeners
            .iter()
            .filter(|(_, l)| l.client == client)
            .collect();
        entries.sort_by_key(|(id, _)| **id);
        entries.into_iter().map(|(_, l)| l.listener.clone()).collect()
    }

    /// Remove every ephemeral node owned by `client`, returning their paths.
    fn remove_ephemerals(&mut self, client: ClientId) -> Vec<String> {
        let owned: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| matches!(node.owner, Some((owner, _)) if owner == client))
            .map(|(path, _)| path.clone())
            .collect();
        for path in &owned {
            self.nodes.remove(path);
        }
        owned
    }

    fn drop_watches_of(&mut self, client: ClientId) {
        self.watches.retain(|_, w| w.client != client);
    }
}

#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn finish_one(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

struct Notifier {
    sender: Mutex<mpsc::Sender<Job>>,
    pending: Arc<Pending>,
}

impl Notifier {
    fn spawn() -> Self {
        let (sender, receiver) = mpsc::channel::<Job>();
        let pending = Arc::new(Pending::default());
        let worker_pending = pending.clone();

        // The thread exits once every sender is dropped.
        let spawned = thread::Builder::new()
            .name("coordination-notifier".to_string())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    let _ = panic::catch_unwind(AssertUnwindSafe(job));
                    worker_pending.finish_one();
                }
            });
        if spawned.is_err() {
            crate::observability::Logger::fatal(
                "COORDINATION_NOTIFIER_SPAWN_FAILED",
                &[("reason", "could not spawn notifier thread")],
            );
        }

        Self {
            sender: Mutex::new(sender),
            pending,
        }
    }

    fn enqueue(&self, job: Job) {
        *self
            .pending
            .count
            .lock()
            .unwrap_or_else(PoisonError::into_inner) += 1;
        let sent = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(job);
        if sent.is_err() {
            self.pending.finish_one();
        }
    }

    fn settle(&self) {
        let mut count = self
            .pending
            .count
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while *count > 0 {
            count = self
                .pending
                .idle
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

struct Shared {
    tree: Mutex<Tree>,
    notifier: Notifier,
}

impl Shared {
    fn tree(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify_deleted(&self, watchers: Vec<NodeWatcher>, path: &str) {
        for watcher in watchers {
            let event = NodeEvent::Deleted(path.to_string());
            self.notifier.enqueue(Box::new(move || watcher(event)));
        }
    }

    fn notify_listeners<F>(&self, listeners: Vec<Arc<dyn SessionListener>>, call: F)
    where
        F: Fn(&dyn SessionListener) + Send + Sync + Clone + 'static,
    {
        for listener in listeners {
            let call = call.clone();
            self.notifier.enqueue(Box::new(move || call(listener.as_ref())));
        }
    }

    /// Delete nodes and queue deletion notifications for them.
    fn delete_and_notify(&self, tree: &mut Tree, deleted: Vec<String>) {
        for path in deleted {
            let watchers = tree.take_watches(&path);
            self.notify_deleted(watchers, &path);
        }
    }
}

/// In-process coordination service shared by any number of clients.
#[derive(Clone)]
pub struct MemoryCoordination {
    shared: Arc<Shared>,
}

impl Default for MemoryCoordination {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCoordination {
    /// Create an empty service with its notifier thread.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                tree: Mutex::new(Tree::default()),
                notifier: Notifier::spawn(),
            }),
        }
    }

    /// Connect a new client with a fresh session.
    pub fn connect(&self) -> Arc<MemoryClient> {
        let id = {
            let mut tree = self.shared.tree();
            let id = tree.next_id();
            tree.sessions.insert(
                id,
                Session {
                    generation: 1,
                    ..Session::default()
                },
            );
            id
        };
        Arc::new(MemoryClient {
            shared: self.shared.clone(),
            id,
        })
    }

    /// Block until every queued notification has been delivered.
    ///
    /// Must not be called from inside a watcher or listener.
    pub fn settle(&self) {
        self.shared.notifier.settle();
    }

    /// Expire the client's session and immediately establish a new one.
    ///
    /// Ephemeral nodes of the old session are deleted (peers' watches fire),
    /// the client's own watches are lost, and its listeners observe
    /// `Expired`, `Connected` and then `on_new_session`.
    pub fn expire_session(&self, client: &MemoryClient) {
        let mut tree = self.shared.tree();
        if tree.check_session(client.id).is_err() {
            return;
        }
        tree.drop_watches_of(client.id);
        let deleted = tree.remove_ephemerals(client.id);
        self.shared.delete_and_notify(&mut tree, deleted);

        if let Some(session) = tree.sessions.get_mut(&client.id) {
            session.generation += 1;
        }
        let listeners = tree.listeners_of(client.id);
        drop(tree);

        self.shared
            .notify_listeners(listeners.clone(), |l| l.on_state_changed(SessionState::Expired));
        self.shared
            .notify_listeners(listeners.clone(), |l| l.on_state_changed(SessionState::Connected));
        self.shared.notify_listeners(listeners, |l| l.on_new_session());
    }

    /// Deliver a new-session notification without touching any node.
    pub fn notify_new_session(&self, client: &MemoryClient) {
        let listeners = self.shared.tree().listeners_of(client.id);
        self.shared.notify_listeners(listeners, |l| l.on_new_session());
    }

    /// Deliver a session-establishment error to the client's listeners.
    pub fn fail_session_establishment(&self, client: &MemoryClient, reason: &str) {
        let listeners = self.shared.tree().listeners_of(client.id);
        let error = CoordinationError::SessionError(reason.to_string());
        self.shared
            .notify_listeners(listeners, move |l| l.on_session_error(&error));
    }

    /// Simulate process death: the session ends for good.
    pub fn kill(&self, client: &MemoryClient) {
        let mut tree = self.shared.tree();
        tree.drop_watches_of(client.id);
        tree.listeners.retain(|_, l| l.client != client.id);
        let deleted = tree.remove_ephemerals(client.id);
        self.shared.delete_and_notify(&mut tree, deleted);
        if let Some(session) = tree.sessions.get_mut(&client.id) {
            session.closed = true;
        }
    }

    /// Delete a node out from under its owner.
    pub fn drop_node(&self, path: &str) -> bool {
        let mut tree = self.shared.tree();
        if tree.nodes.remove(path).is_none() {
            return false;
        }
        self.shared.delete_and_notify(&mut tree, Vec::from([path.to_string()]));
        true
    }

    /// Make every operation of the client fail with `Unavailable`.
    ///
    /// The session survives. Listeners observe `Disconnected` when the
    /// outage begins and `Connected` when it ends.
    pub fn set_unavailable(&self, client: &MemoryClient, unavailable: bool) {
        let mut tree = self.shared.tree();
        let changed = match tree.sessions.get_mut(&client.id) {
            Some(session) if session.unavailable != unavailable => {
                session.unavailable = unavailable;
                true
            }
            _ => false,
        };
        if !changed {
            return;
        }
        let listeners = tree.listeners_of(client.id);
        drop(tree);

        let state = if unavailable {
            SessionState::Disconnected
        } else {
            SessionState::Connected
        };
        self.shared
            .notify_listeners(listeners, move |l| l.on_state_changed(state));
    }

    /// Payload of a node, if it exists
    pub fn node_data(&self, path: &str) -> Option<Vec<u8>> {
        self.shared.tree().nodes.get(path).map(|n| n.data.clone())
    }

    /// Whether a node exists
    pub fn node_exists(&self, path: &str) -> bool {
        self.shared.tree().node_exists(path)
    }

    /// Child names of a node
    pub fn children_of(&self, path: &str) -> Vec<String> {
        self.shared.tree().child_names(path)
    }

    /// Number of registered watches on a path
    pub fn watch_count(&self, path: &str) -> usize {
        self.shared
            .tree()
            .watches
            .values()
            .filter(|w| w.path == path)
            .count()
    }
}

/// One process's connection to a `MemoryCoordination` service.
pub struct MemoryClient {
    shared: Arc<Shared>,
    id: ClientId,
}

impl MemoryClient {
    /// Client identifier within the service
    pub fn id(&self) -> u64 {
        self.id
    }
}

fn validate_path(path: &str) -> CoordinationResult<()> {
    if !path.starts_with('/') || (path.len() > 1 && path.ends_with('/')) {
        return Err(CoordinationError::NoNode(path.to_string()));
    }
    Ok(())
}

impl CoordinationClient for MemoryClient {
    fn create_persistent(&self, path: &str, create_parents: bool) -> CoordinationResult<()> {
        validate_path(path)?;
        let mut tree = self.shared.tree();
        tree.check_session(self.id)?;

        if tree.node_exists(path) {
            return if create_parents {
                Ok(())
            } else {
                Err(CoordinationError::NodeExists(path.to_string()))
            };
        }

        if create_parents {
            let mut missing = Vec::new();
            let mut current = path;
            while !tree.node_exists(current) {
                missing.push(current.to_string());
                current = paths::parent(current);
            }
            for node in missing.into_iter().rev() {
                tree.nodes.insert(
                    node,
                    Node {
                        data: Vec::new(),
                        owner: None,
                    },
                );
            }
            return Ok(());
        }

        if !tree.node_exists(paths::parent(path)) {
            return Err(CoordinationError::NoNode(path.to_string()));
        }
        tree.nodes.insert(
            path.to_string(),
            Node {
                data: Vec::new(),
                owner: None,
            },
        );
        Ok(())
    }

    fn create_ephemeral(&self, path: &str, data: Vec<u8>) -> CoordinationResult<()> {
        validate_path(path)?;
        let mut tree = self.shared.tree();
        let generation = tree.check_session(self.id)?;

        if tree.node_exists(path) {
            return Err(CoordinationError::NodeExists(path.to_string()));
        }
        if !tree.node_exists(paths::parent(path)) {
            return Err(CoordinationError::NoNode(path.to_string()));
        }
        tree.nodes.insert(
            path.to_string(),
            Node {
                data,
                owner: Some((self.id, generation)),
            },
        );
        Ok(())
    }

    fn read(&self, path: &str) -> CoordinationResult<Option<Vec<u8>>> {
        let tree = self.shared.tree();
        tree.check_session(self.id)?;
        Ok(tree.nodes.get(path).map(|n| n.data.clone()))
    }

    fn children(&self, path: &str) -> CoordinationResult<Vec<String>> {
        let tree = self.shared.tree();
        tree.check_session(self.id)?;
        if !tree.node_exists(path) {
            return Err(CoordinationError::NoNode(path.to_string()));
        }
        Ok(tree.child_names(path))
    }

    fn delete(&self, path: &str) -> CoordinationResult<bool> {
        let mut tree = self.shared.tree();
        tree.check_session(self.id)?;
        if tree.nodes.remove(path).is_none() {
            return Ok(false);
        }
        self.shared
            .delete_and_notify(&mut tree, Vec::from([path.to_string()]));
        Ok(true)
    }

    fn exists(&self, path: &str) -> CoordinationResult<bool> {
        let tree = self.shared.tree();
        tree.check_session(self.id)?;
        Ok(tree.node_exists(path))
    }

    fn watch_deletion(&self, path: &str, watcher: NodeWatcher) -> CoordinationResult<Option<WatchId>> {
        let mut tree = self.shared.tree();
        tree.check_session(self.id)?;
        if !tree.nodes.contains_key(path) {
            return Ok(None);
        }
        let id = tree.next_id();
        tree.watches.insert(
            id,
            Watch {
                path: path.to_string(),
                client: self.id,
                watcher,
            },
        );
        Ok(Some(id))
    }

    fn unwatch(&self, id: WatchId) {
        self.shared.tree().watches.remove(&id);
    }

    fn subscribe(&self, listener: Arc<dyn SessionListener>) -> ListenerId {
        let mut tree = self.shared.tree();
        let id = tree.next_id();
        tree.listeners.insert(
            id,
            Listener {
                client: self.id,
                listener,
            },
        );
        id
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.shared.tree().listeners.remove(&id);
    }

    fn close(&self) {
        let mut tree = self.shared.tree();
        tree.drop_watches_of(self.id);
        tree.listeners.retain(|_, l| l.client != self.id);
        let deleted = tree.remove_ephemerals(self.id);
        self.shared.delete_and_notify(&mut tree, deleted);
        if let Some(session) = tree.sessions.get_mut(&self.id) {
            session.closed = true;
        }
    }
}
