//! Remote client pool
//!
//! One client per distinct manager address, shared by every destination
//! pointed at it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::client::RemoteConfigClient;
use super::errors::ManagerResult;
use super::http::{HttpConfigClient, ManagerAuth};

/// Builds a client for an address
pub type ClientFactory =
    Box<dyn Fn(&str) -> ManagerResult<Arc<dyn RemoteConfigClient>> + Send + Sync>;

/// Get-or-create map of remote clients keyed by address
pub struct ClientPool {
    factory: ClientFactory,
    clients: Mutex<HashMap<String, Arc<dyn RemoteConfigClient>>>,
}

impl ClientPool {
    /// Pool with a custom factory.
    pub fn new(factory: ClientFactory) -> Self {
        Self {
            factory,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Pool of `HttpConfigClient`s sharing one identity.
    pub fn http(auth: ManagerAuth) -> Self {
        Self::new(Box::new(move |address: &str| {
            let client = HttpConfigClient::new(address, auth.clone())?;
            Ok(Arc::new(client) as Arc<dyn RemoteConfigClient>)
        }))
    }

    /// Client for `address`, created on first use.
    ///
    /// The pool lock is held while the factory runs, so one address never
    /// gets two clients.
    pub fn client(&self, address: &str) -> ManagerResult<Arc<dyn RemoteConfigClient>> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(address) {
            return Ok(client.clone());
        }
        let client = (self.factory)(address)?;
        clients.insert(address.to_string(), client.clone());
        Ok(client)
    }

    /// Number of distinct addresses with a client
    pub fn len(&self) -> usize {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no client was created yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::StaticConfigClient;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_one_client_per_address() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();
        let pool = ClientPool::new(Box::new(move |address: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(StaticConfigClient::new(address)) as Arc<dyn RemoteConfigClient>)
        }));

        let a = pool.client("m1:8089").unwrap();
        let b = pool.client("m1:8089").unwrap();
        let c = pool.client("m2:8089").unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(c.address(), "m2:8089");
        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert_eq!(pool.len(), 2);
    }
}
