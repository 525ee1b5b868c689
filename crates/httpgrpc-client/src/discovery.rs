//! Naming services that feed live endpoints to a discovery-backed pool.
//!
//! A naming service hands out a [`watch::Receiver`] per target. The value is
//! `None` until the first lookup has finished, then the latest endpoint set.
//! Watch tasks stop once every receiver is gone.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::resolver::DiscoveryTarget;

/// Latest endpoint set of a target, `None` while still unresolved.
pub type Endpoints = Option<Vec<String>>;

/// Pluggable source of live endpoints.
pub trait NamingService: Send + Sync + 'static {
    /// Starts watching `target`. Must be called within a tokio runtime.
    fn watch(&self, target: &DiscoveryTarget) -> watch::Receiver<Endpoints>;
}

impl<N: NamingService + ?Sized> NamingService for Arc<N> {
    fn watch(&self, target: &DiscoveryTarget) -> watch::Receiver<Endpoints> {
        (**self).watch(target)
    }
}

/// Endpoint set controlled by the owner, the same for every target.
///
/// # Example
///
/// ```
/// use httpgrpc_client::discovery::StaticNamingService;
///
/// let naming = StaticNamingService::new(vec!["10.0.0.1:9095".to_string()]);
/// naming.set_endpoints(vec!["10.0.0.2:9095".to_string()]);
/// assert_eq!(naming.endpoints(), ["10.0.0.2:9095"]);
/// ```
#[derive(Debug, Clone)]
pub struct StaticNamingService {
    endpoints: Arc<watch::Sender<Endpoints>>,
}

impl StaticNamingService {
    pub fn new(endpoints: Vec<String>) -> Self {
        let (tx, _) = watch::channel(Some(endpoints));
        Self {
            endpoints: Arc::new(tx),
        }
    }

    /// Replaces the endpoint set; every watcher sees the change.
    pub fn set_endpoints(&self, endpoints: Vec<String>) {
        self.endpoints.send_replace(Some(endpoints));
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.endpoints.borrow().clone().unwrap_or_default()
    }
}

impl NamingService for StaticNamingService {
    fn watch(&self, _target: &DiscoveryTarget) -> watch::Receiver<Endpoints> {
        self.endpoints.subscribe()
    }
}

/// Shortest time between two DNS lookups of one name.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(100);

/// DNS naming service configuration.
#[derive(Debug, Clone)]
pub struct DnsConfig {
    /// Cluster DNS suffix, e.g. `cluster.local`
    pub cluster_domain: String,
    /// Namespace used when the address carries no qualifier
    pub default_namespace: String,
    /// Time between lookups; raised to [`MIN_REFRESH_INTERVAL`] if shorter
    pub refresh_interval: Duration,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            cluster_domain: "cluster.local".to_string(),
            default_namespace: "default".to_string(),
            refresh_interval: Duration::from_secs(5),
        }
    }
}

impl DnsConfig {
    pub fn with_cluster_domain(mut self, domain: impl Into<String>) -> Self {
        self.cluster_domain = domain.into();
        self
    }

    pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = namespace.into();
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// The name looked up for `target`: `<service>.<namespace>.svc.<domain>:<port>`.
    pub fn lookup_name(&self, target: &DiscoveryTarget) -> String {
        let namespace = target
            .namespace
            .as_deref()
            .unwrap_or(&self.default_namespace);
        format!(
            "{}.{}.svc.{}:{}",
            target.service, namespace, self.cluster_domain, target.port
        )
    }
}

/// Periodically resolves the service's cluster DNS name.
///
/// Headless services resolve to one record per ready pod, which is the
/// endpoint set. A failed lookup keeps the last good set.
#[derive(Debug, Clone, Default)]
pub struct DnsNamingService {
    config: DnsConfig,
}

impl DnsNamingService {
    pub fn new(config: DnsConfig) -> Self {
        Self { config }
    }
}

impl NamingService for DnsNamingService {
    fn watch(&self, target: &DiscoveryTarget) -> watch::Receiver<Endpoints> {
        let (tx, rx) = watch::channel(None);
        let name = self.config.lookup_name(target);
        let refresh = self.config.refresh_interval.max(MIN_REFRESH_INTERVAL);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(refresh);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    _ = interval.tick() => {}
                }

                match lookup(&name).await {
                    Ok(endpoints) => {
                        tx.send_if_modified(|current| {
                            if current.as_ref() == Some(&endpoints) {
                                return false;
                            }
                            info!(name = %name, count = endpoints.len(), "Endpoints updated");
                            *current = Some(endpoints);
                            true
                        });
                    }
                    Err(e) => {
                        warn!(name = %name, error = %e, "DNS lookup failed");
                        // Unblock anyone waiting on the first resolution
                        tx.send_if_modified(|current| {
                            if current.is_none() {
                                *current = Some(Vec::new());
                                true
                            } else {
                                false
                            }
                        });
                    }
                }
            }

            debug!(name = %name, "DNS watch stopped");
        });

        rx
    }
}

async fn lookup(name: &str) -> std::io::Result<Vec<String>> {
    let addrs: BTreeSet<String> = tokio::net::lookup_host(name)
        .await?
        .map(|addr| addr.to_string())
        .collect();
    Ok(addrs.into_iter().collect())
}
