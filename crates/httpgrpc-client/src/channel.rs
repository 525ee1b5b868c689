use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use httpgrpc_common::transport::{Codec, TcpTransport};
use httpgrpc_common::{HttpgrpcError, Result};

use crate::balancer::LoadBalancer;
use crate::connection::Connection;
use crate::discovery::{Endpoints, NamingService};
use crate::resolver::Policy;

type Connections = Arc<Mutex<HashMap<String, Arc<Connection>>>>;

/// Everything a client owns to reach its backends.
///
/// Holds the resolved target, the live endpoint pool and one multiplexed
/// connection per endpoint. For discovery targets a watcher task keeps the
/// pool in sync with the naming service until the channel is dropped.
pub struct Channel {
    target: String,
    policy: Policy,
    transport: TcpTransport,
    codec: Codec,
    balancer: Arc<Mutex<LoadBalancer>>,
    connections: Connections,
    _watcher: Option<DropGuard>,
}

impl Channel {
    /// A channel to a single fixed endpoint.
    pub fn direct(target: String, transport: TcpTransport, codec: Codec) -> Self {
        let balancer = LoadBalancer::new(vec![target.clone()]);
        Self {
            target,
            policy: Policy::Direct,
            transport,
            codec,
            balancer: Arc::new(Mutex::new(balancer)),
            connections: Arc::new(Mutex::new(HashMap::new())),
            _watcher: None,
        }
    }

    /// A channel whose endpoints come from `naming`.
    ///
    /// Waits up to `initial_wait` for the first resolution; a target that is
    /// still unresolved after that starts with an empty pool.
    pub async fn discovery(
        target: String,
        policy: Policy,
        naming: &dyn NamingService,
        transport: TcpTransport,
        codec: Codec,
        initial_wait: Duration,
    ) -> Result<Self> {
        let Policy::Discovery(discovery) = &policy else {
            return Err(HttpgrpcError::invalid_address(
                &target,
                "discovery channel needs a discovery target",
            ));
        };

        let mut updates = naming.watch(discovery);
        if updates.borrow().is_none() {
            let first = tokio::time::timeout(initial_wait, updates.wait_for(Option::is_some));
            if first.await.is_err() {
                warn!(target = %target, "No endpoints resolved yet");
            }
        }

        let initial = updates.borrow_and_update().clone().unwrap_or_default();
        info!(target = %target, endpoints = initial.len(), "Discovery channel ready");

        let balancer = Arc::new(Mutex::new(LoadBalancer::new(initial)));
        let connections: Connections = Arc::new(Mutex::new(HashMap::new()));

        let stop = CancellationToken::new();
        tokio::spawn(watch_endpoints(
            target.clone(),
            updates,
            balancer.clone(),
            connections.clone(),
            stop.clone(),
        ));

        Ok(Self {
            target,
            policy,
            transport,
            codec,
            balancer,
            connections,
            _watcher: Some(stop.drop_guard()),
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Current endpoint set, in rotation order.
    pub fn endpoints(&self) -> Vec<String> {
        lock(&self.balancer).endpoints()
    }

    /// Picks the next endpoint and returns an open connection to it.
    ///
    /// Endpoints that refuse the connection are skipped; each endpoint is
    /// tried at most once per call.
    ///
    /// # Errors
    ///
    /// - `Unavailable` when the pool is empty
    /// - the last connect error when every endpoint failed
    pub async fn connection(&self) -> Result<Arc<Connection>> {
        let attempts = lock(&self.balancer).endpoint_count();
        let mut last_err = None;

        for _ in 0..attempts {
            let next = lock(&self.balancer).next_endpoint();
            let Some(endpoint) = next else {
                break;
            };
            match self.connect(&endpoint).await {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    warn!(target = %self.target, endpoint = %endpoint, error = %e, "Endpoint unreachable");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            HttpgrpcError::Unavailable(format!("no endpoints for {}", self.target))
        }))
    }

    async fn connect(&self, endpoint: &str) -> Result<Arc<Connection>> {
        let cached = lock(&self.connections).get(endpoint).cloned();
        if let Some(conn) = cached.filter(|conn| !conn.is_closed()) {
            return Ok(conn);
        }

        let fresh = Arc::new(Connection::connect(endpoint, &self.transport, self.codec).await?);

        let mut connections = lock(&self.connections);
        // Another caller may have connected meanwhile; keep theirs
        if let Some(existing) = connections.get(endpoint) {
            if !existing.is_closed() {
                return Ok(existing.clone());
            }
        }
        connections.insert(endpoint.to_string(), fresh.clone());
        Ok(fresh)
    }
}

async fn watch_endpoints(
    target: String,
    mut updates: watch::Receiver<Endpoints>,
    balancer: Arc<Mutex<LoadBalancer>>,
    connections: Connections,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    debug!(target = %target, "Naming service went away");
                    break;
                }
            }
        }

        let latest = updates.borrow_and_update().clone();
        let Some(endpoints) = latest else {
            continue;
        };

        let removed = lock(&balancer).set_endpoints(&endpoints);
        if !removed.is_empty() {
            let mut connections = lock(&connections);
            for endpoint in &removed {
                connections.remove(endpoint);
            }
        }

        info!(
            target = %target,
            endpoints = endpoints.len(),
            removed = removed.len(),
            "Endpoint set changed"
        );
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
