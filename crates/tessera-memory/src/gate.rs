//! Lazy, at-most-once loading of an expensive optional subsystem.
//!
//! A [`LazyGate`] starts in [`Availability::Unknown`] and performs its first
//! load only when a caller actually asks for the client. The load runs in
//! its own task and records its outcome in the gate; callers only wait on
//! it. A burst of requests during startup triggers exactly one load, every
//! caller observes the same outcome, and a caller that gives up (a dropped
//! request) does not abandon the load.
//!
//! ```text
//!            get_client()
//!  Unknown ───────────────▶ Available   (client cached)
//!     │
//!     └───────────────────▶ Unavailable (error recorded, never retried)
//!                                │
//!            reset() ◀───────────┘
//! ```
//!
//! A failed load is not an error for the caller: `get_client()` returns
//! `None` and callers proceed without the subsystem.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::MemoryError;

type LoadFuture<T> = BoxFuture<'static, Result<Arc<T>, String>>;
type Loader<T> = Box<dyn Fn() -> LoadFuture<T> + Send + Sync>;
type InFlight<T> = Shared<BoxFuture<'static, Option<Arc<T>>>>;

/// Tri-state availability of the gated subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    /// No load has been attempted yet.
    Unknown,
    /// The client is loaded and cached.
    Available,
    /// The last load failed or the subsystem is disabled.
    Unavailable,
}

/// Diagnostic snapshot of a gate. Taking it never triggers a load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateStatus {
    /// Name of the gated subsystem.
    pub name: String,
    /// `None` until the first load attempt has resolved.
    pub available: Option<bool>,
    /// Whether a client is cached.
    pub client_loaded: bool,
    /// Message from the most recent failed load.
    pub last_error: Option<String>,
    /// When the most recent load attempt finished.
    pub load_attempted_at: Option<DateTime<Utc>>,
    /// Number of times the loader has been invoked.
    pub load_count: u64,
}

struct GateState<T: ?Sized> {
    availability: Availability,
    client: Option<Arc<T>>,
    last_error: Option<String>,
    load_attempted_at: Option<DateTime<Utc>>,
}

impl<T: ?Sized> GateState<T> {
    fn unknown() -> Self {
        Self {
            availability: Availability::Unknown,
            client: None,
            last_error: None,
            load_attempted_at: None,
        }
    }

    /// `Some(outcome)` once the gate has resolved, `None` while unknown.
    fn resolved(&self) -> Option<Option<Arc<T>>> {
        match self.availability {
            Availability::Unknown => None,
            Availability::Available => Some(self.client.clone()),
            Availability::Unavailable => Some(None),
        }
    }

    fn succeed(&mut self, client: Arc<T>) {
        self.availability = Availability::Available;
        self.client = Some(client);
        self.last_error = None;
        self.load_attempted_at = Some(Utc::now());
    }

    fn fail(&mut self, error: String) {
        self.availability = Availability::Unavailable;
        self.client = None;
        self.last_error = Some(error);
        self.load_attempted_at = Some(Utc::now());
    }
}

/// Guarded, at-most-once initializer for an optional subsystem.
pub struct LazyGate<T: ?Sized> {
    name: String,
    capability: bool,
    load_timeout: Option<Duration>,
    loader: Loader<T>,
    state: Arc<RwLock<GateState<T>>>,
    in_flight: Mutex<Option<InFlight<T>>>,
    load_count: AtomicU64,
}

impl<T: ?Sized + Send + Sync + 'static> LazyGate<T> {
    /// Create a gate around an async loader.
    ///
    /// `capability` is the startup registration of whether the subsystem is
    /// configured at all. When it is `false` the loader is never invoked.
    pub fn new<F, Fut, E>(name: impl Into<String>, capability: bool, loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<T>, E>> + Send + 'static,
        E: Display + 'static,
    {
        let loader: Loader<T> = Box::new(move || {
            let fut = loader();
            Box::pin(async move { fut.await.map_err(|e| e.to_string()) })
        });

        Self {
            name: name.into(),
            capability,
            load_timeout: None,
            loader,
            state: Arc::new(RwLock::new(GateState::unknown())),
            in_flight: Mutex::new(None),
            load_count: AtomicU64::new(0),
        }
    }

    /// Create a gate around a synchronous loader.
    ///
    /// The loader runs on tokio's blocking pool so a slow load never stalls
    /// the threads serving requests.
    pub fn blocking<F, E>(name: impl Into<String>, capability: bool, load: F) -> Self
    where
        F: Fn() -> Result<Arc<T>, E> + Send + Sync + 'static,
        E: Display + Send + 'static,
    {
        let load = Arc::new(load);
        Self::new(name, capability, move || {
            let load = Arc::clone(&load);
            async move {
                match tokio::task::spawn_blocking(move || load()).await {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(e) => Err(format!("loader task failed: {}", e)),
                }
            }
        })
    }

    /// Bound each load attempt. Expiry counts as a failed load.
    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = Some(timeout);
        self
    }

    /// Name of the gated subsystem.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the subsystem can be used, without triggering a load.
    ///
    /// Before the first load this reports the registered capability.
    pub fn is_available(&self) -> bool {
        match self.state.read().availability {
            Availability::Unknown => self.capability,
            Availability::Available => true,
            Availability::Unavailable => false,
        }
    }

    /// Current availability state.
    pub fn availability(&self) -> Availability {
        self.state.read().availability
    }

    /// Return the client, loading it on first use.
    ///
    /// Returns `None` when the subsystem is disabled or its load failed; a
    /// failed gate is not retried until [`reset`](Self::reset).
    pub async fn get_client(&self) -> Option<Arc<T>> {
        let resolved = self.state.read().resolved();
        if let Some(outcome) = resolved {
            return outcome;
        }

        let load = {
            let mut in_flight = self.in_flight.lock();

            // Another caller may have finished the load in the meantime.
            let resolved = self.state.read().resolved();
            if let Some(outcome) = resolved {
                return outcome;
            }

            if !self.capability {
                let error =
                    MemoryError::SubsystemUnavailable(format!("{} is not enabled", self.name));
                self.state.write().fail(error.to_string());
                return None;
            }

            in_flight.get_or_insert_with(|| self.start_load()).clone()
        };

        load.await
    }

    /// Spawn the single load task. Must be called with `in_flight` held.
    fn start_load(&self) -> InFlight<T> {
        self.load_count.fetch_add(1, Ordering::SeqCst);
        info!(subsystem = %self.name, "Loading subsystem");

        let load = (self.loader)();
        let limit = self.load_timeout;
        let state = Arc::clone(&self.state);
        let name = self.name.clone();

        let task = tokio::spawn(async move {
            let started = Instant::now();
            let result = match limit {
                Some(limit) => match tokio::time::timeout(limit, load).await {
                    Ok(result) => result,
                    Err(_) => Err(MemoryError::Timeout {
                        operation: "subsystem load",
                        after: limit,
                    }
                    .to_string()),
                },
                None => load.await,
            };

            let duration_ms = started.elapsed().as_millis() as u64;
            match result {
                Ok(client) => {
                    state.write().succeed(Arc::clone(&client));
                    info!(subsystem = %name, duration_ms, "Subsystem loaded");
                    Some(client)
                }
                Err(error) => {
                    warn!(subsystem = %name, duration_ms, error = %error, "Subsystem load failed");
                    state.write().fail(error);
                    None
                }
            }
        });

        let state = Arc::clone(&self.state);
        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    // The loader panicked; nothing was recorded.
                    state.write().fail(format!("loader task failed: {}", e));
                    None
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Diagnostic snapshot. Never triggers a load.
    pub fn get_status(&self) -> GateStatus {
        let state = self.state.read();
        GateStatus {
            name: self.name.clone(),
            available: match state.availability {
                Availability::Unknown => None,
                Availability::Available => Some(true),
                Availability::Unavailable => Some(false),
            },
            client_loaded: state.client.is_some(),
            last_error: state.last_error.clone(),
            load_attempted_at: state.load_attempted_at,
            load_count: self.load_count.load(Ordering::SeqCst),
        }
    }

    /// Forget the cached client or failure so the next `get_client` reloads.
    ///
    /// Waits for an in-flight load to finish first.
    pub async fn reset(&self) {
        let pending = self.in_flight.lock().clone();
        if let Some(load) = pending {
            load.await;
        }

        let mut in_flight = self.in_flight.lock();
        *in_flight = None;
        let mut state = self.state.write();
        let previous = state.availability;
        *state = GateState::unknown();
        debug!(subsystem = %self.name, ?previous, "Gate reset");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug)]
    struct Client {
        id: usize,
    }

    fn counting_gate(
        loads: Arc<AtomicUsize>,
        fail: bool,
        delay: Duration,
    ) -> LazyGate<Client> {
        LazyGate::new("test", true, move || {
            let loads = Arc::clone(&loads);
            async move {
                let n = loads.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                if fail {
                    Err("boom".to_string())
                } else {
                    Ok(Arc::new(Client { id: n }))
                }
            }
        })
    }

    #[tokio::test]
    async fn test_status_before_load() {
        let gate = counting_gate(Arc::new(AtomicUsize::new(0)), false, Duration::ZERO);

        assert!(gate.is_available());
        assert_eq!(gate.availability(), Availability::Unknown);

        let status = gate.get_status();
        assert_eq!(status.name, "test");
        assert_eq!(status.available, None);
        assert!(!status.client_loaded);
        assert!(status.last_error.is_none());
        assert!(status.load_attempted_at.is_none());
        assert_eq!(status.load_count, 0);
    }

    #[tokio::test]
    async fn test_successful_load_is_cached() {
        let loads = Arc::new(AtomicUsize::new(0));
        let gate = counting_gate(Arc::clone(&loads), false, Duration::ZERO);

        let first = gate.get_client().await.unwrap();
        let second = gate.get_client().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.id, 0);
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        let status = gate.get_status();
        assert_eq!(status.available, Some(true));
        assert!(status.client_loaded);
        assert!(status.load_attempted_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_single_load() {
        let loads = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(counting_gate(
            Arc::clone(&loads),
            false,
            Duration::from_millis(50),
        ));

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let gate = Arc::clone(&gate);
                tokio::spawn(async move { gate.get_client().await })
            })
            .collect();

        let mut clients = Vec::new();
        for handle in handles {
            clients.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(clients.len(), 50);
        assert!(clients.iter().all(|c| Arc::ptr_eq(c, &clients[0])));
        assert_eq!(gate.get_status().load_count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_single_failure() {
        let loads = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(counting_gate(
            Arc::clone(&loads),
            true,
            Duration::from_millis(20),
        ));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let gate = Arc::clone(&gate);
                tokio::spawn(async move { gate.get_client().await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_none());
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_permanent_until_reset() {
        let loads = Arc::new(AtomicUsize::new(0));
        let gate = counting_gate(Arc::clone(&loads), true, Duration::ZERO);

        assert!(gate.get_client().await.is_none());
        for _ in 0..5 {
            assert!(!gate.is_available());
            assert!(gate.get_client().await.is_none());
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        let status = gate.get_status();
        assert_eq!(status.available, Some(false));
        assert!(!status.client_loaded);
        assert_eq!(status.last_error.as_deref(), Some("boom"));
        assert!(status.load_attempted_at.is_some());

        gate.reset().await;
        assert_eq!(gate.availability(), Availability::Unknown);
        assert!(gate.get_status().last_error.is_none());

        assert!(gate.get_client().await.is_none());
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reset_after_success_reloads() {
        let loads = Arc::new(AtomicUsize::new(0));
        let gate = counting_gate(Arc::clone(&loads), false, Duration::ZERO);

        let first = gate.get_client().await.unwrap();
        gate.reset().await;
        let second = gate.get_client().await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.id, 1);
    }

    #[tokio::test]
    async fn test_disabled_capability_never_loads() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let gate: LazyGate<Client> = LazyGate::new("graph", false, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(Arc::new(Client { id: 0 }))
            }
        });

        assert!(!gate.is_available());
        assert!(gate.get_client().await.is_none());
        assert_eq!(loads.load(Ordering::SeqCst), 0);

        let status = gate.get_status();
        assert_eq!(status.available, Some(false));
        assert!(status.last_error.unwrap().contains("not enabled"));
    }

    #[tokio::test]
    async fn test_load_timeout_counts_as_failure() {
        let loads = Arc::new(AtomicUsize::new(0));
        let gate = counting_gate(Arc::clone(&loads), false, Duration::from_secs(5))
            .with_load_timeout(Duration::from_millis(20));

        assert!(gate.get_client().await.is_none());
        assert_eq!(gate.availability(), Availability::Unavailable);
        assert!(gate.get_status().last_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_blocking_loader() {
        let gate: LazyGate<Client> = LazyGate::blocking("blocking", true, || {
            std::thread::sleep(Duration::from_millis(10));
            Ok::<_, String>(Arc::new(Client { id: 7 }))
        });

        assert_eq!(gate.get_client().await.unwrap().id, 7);
    }

    #[tokio::test]
    async fn test_blocking_loader_error() {
        let gate: LazyGate<Client> =
            LazyGate::blocking("blocking", true, || Err::<Arc<Client>, _>("missing library"));

        assert!(gate.get_client().await.is_none());
        assert_eq!(
            gate.get_status().last_error.as_deref(),
            Some("missing library")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_caller_does_not_restart_load() {
        let loads = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(counting_gate(
            Arc::clone(&loads),
            false,
            Duration::from_millis(100),
        ));

        let first = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.get_client().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.get_client().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        first.abort();
        assert!(first.await.unwrap_err().is_cancelled());

        let client = waiter.await.unwrap().unwrap();
        assert_eq!(client.id, 0);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(gate.get_status().load_count, 1);
    }

    #[tokio::test]
    async fn test_load_finishes_without_any_caller() {
        let loads = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(counting_gate(
            Arc::clone(&loads),
            false,
            Duration::from_millis(30),
        ));

        let caller = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.get_client().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        caller.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(gate.availability(), Availability::Available);
        assert_eq!(gate.get_client().await.unwrap().id, 0);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }
}
