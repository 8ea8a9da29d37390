//! Per-datacenter machine inventory with single-flight background refresh.

use crate::core::{
    domain::{
        error::{VirtualizationError, VirtualizationResult},
        model::{
            datacenter_endpoint::{DatacenterEndpoint, MAX_REFRESH_SECONDS},
            inventory_snapshot::InventorySnapshot,
            virtual_machine::{MachineListing, VirtualMachineIdentity},
        },
        value_object::DatacenterUri,
    },
    infrastructure::{connection_manager::ConnectionManager, interrupt::Interrupt},
};
use arc_swap::ArcSwapOption;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info};

/// How long a refresh worker waits for a connection and a listing together.
pub const DEFAULT_LISTING_TIMEOUT: Duration = Duration::from_secs(60);

/// The machines one datacenter is known to hold.
///
/// Readers load the published snapshot without locking. A stale or missing
/// snapshot starts a background refresh but is still returned right away; at
/// most one refresh runs per datacenter at a time.
#[derive(Clone)]
pub struct InventoryCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    endpoint: Arc<DatacenterEndpoint>,
    connections: Arc<ConnectionManager>,
    snapshot: ArcSwapOption<InventorySnapshot>,
    in_flight: Mutex<Option<watch::Receiver<bool>>>,
    listing_timeout: Duration,
}

/// Lets a caller wait for the refresh it triggered or joined.
#[derive(Debug, Clone)]
pub struct RefreshTicket {
    rx: watch::Receiver<bool>,
}

impl RefreshTicket {
    /// Completes when the refresh worker has finished, successfully or not.
    pub async fn finished(mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl InventoryCache {
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self::with_listing_timeout(connections, DEFAULT_LISTING_TIMEOUT)
    }

    /// A cache whose refresh gives up after `listing_timeout`, keeping the old snapshot.
    pub fn with_listing_timeout(
        connections: Arc<ConnectionManager>,
        listing_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                endpoint: Arc::clone(connections.endpoint()),
                connections,
                snapshot: ArcSwapOption::empty(),
                in_flight: Mutex::new(None),
                listing_timeout,
            }),
        }
    }

    pub fn datacenter_uri(&self) -> &DatacenterUri {
        self.inner.endpoint.uri()
    }

    /// Resolves a machine name to its identity.
    ///
    /// Must be called within a Tokio runtime, since a stale snapshot spawns a
    /// refresh.
    ///
    /// # Errors
    /// `VirtualizationError::Resolution` if the current snapshot does not
    /// contain the machine (or there is no snapshot yet).
    pub fn lookup(&self, machine_name: &str) -> VirtualizationResult<Arc<VirtualMachineIdentity>> {
        self.current()
            .and_then(|snapshot| {
                snapshot
                    .get(machine_name)
                    .map(|entry| Arc::clone(&entry.identity))
            })
            .ok_or_else(|| VirtualizationError::Resolution {
                uri: self.datacenter_uri().to_string(),
                name: machine_name.to_string(),
            })
    }

    /// The current snapshot, or an empty one if none has been published yet.
    pub fn list(&self) -> Arc<InventorySnapshot> {
        self.current()
            .unwrap_or_else(|| Arc::new(InventorySnapshot::empty()))
    }

    /// The published snapshot, without triggering a refresh.
    pub fn snapshot(&self) -> Option<Arc<InventorySnapshot>> {
        self.inner.snapshot.load_full()
    }

    pub fn is_refreshing(&self) -> bool {
        let in_flight = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        in_flight.as_ref().is_some_and(is_running)
    }

    /// Starts a refresh unless one is already running, and returns a ticket for it.
    pub fn refresh(&self) -> RefreshTicket {
        let mut in_flight = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(rx) = in_flight.as_ref() {
            if is_running(rx) {
                return RefreshTicket { rx: rx.clone() };
            }
        }

        let (tx, rx) = watch::channel(false);
        *in_flight = Some(rx.clone());
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.run_refresh().await;
            tx.send_replace(true);
        });
        RefreshTicket { rx }
    }

    fn current(&self) -> Option<Arc<InventorySnapshot>> {
        let snapshot = self.inner.snapshot.load_full();
        let stale = snapshot
            .as_ref()
            .is_none_or(|snapshot| snapshot.is_stale(Instant::now()));
        if stale {
            self.refresh();
        }
        snapshot
    }
}

// A worker whose sender is gone without reporting completion has died.
fn is_running(rx: &watch::Receiver<bool>) -> bool {
    !*rx.borrow() && rx.has_changed().is_ok()
}

impl CacheInner {
    async fn run_refresh(&self) {
        let uri = self.endpoint.uri();
        let username = self.endpoint.username();
        info!(datacenter = %uri, "starting inventory refresh");

        let fetched = tokio::time::timeout(self.listing_timeout, self.fetch_listing())
            .await
            .unwrap_or_else(|_| {
                Err(VirtualizationError::connection(
                    uri.as_str(),
                    username.as_str(),
                    format!("no inventory within {:?}", self.listing_timeout),
                ))
            });
        match fetched {
            Ok(listing) => {
                let previous = self.snapshot.load_full();
                let now = Instant::now();
                let valid_until = now
                    .checked_add(self.endpoint.refresh_interval())
                    .or_else(|| now.checked_add(Duration::from_secs(MAX_REFRESH_SECONDS)))
                    .unwrap_or(now);
                let next = InventorySnapshot::reconcile(previous.as_deref(), uri, listing, valid_until);
                let machines = next.len();
                self.snapshot.store(Some(Arc::new(next)));
                info!(datacenter = %uri, machines, "saved updated inventory");
            }
            Err(e) => {
                error!(
                    datacenter = %uri,
                    username = %username,
                    error = %e,
                    "cannot refresh inventory of datacenter {} as {}/******",
                    uri,
                    username
                );
            }
        }
        info!(datacenter = %uri, "finished inventory refresh");
    }

    async fn fetch_listing(&self) -> VirtualizationResult<Vec<MachineListing>> {
        let handle = self.connections.get_connection(&Interrupt::never()).await?;
        handle.list_machines().await.map_err(|e| {
            VirtualizationError::connection(
                self.endpoint.uri().as_str(),
                self.endpoint.username().as_str(),
                e.to_string(),
            )
        })
    }
}
