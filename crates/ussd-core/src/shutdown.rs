//! Graceful shutdown
//!
//! On SIGINT/SIGTERM the server stops admitting requests, waits for the
//! in-flight ones to put their sessions back, then closes storage.
//!
//! ## Usage
//!
//! ```ignore
//! let shutdown = ShutdownController::new();
//!
//! // In the request handler
//! let Some(_guard) = shutdown.try_begin_request() else {
//!     return StatusCode::SERVICE_UNAVAILABLE;
//! };
//!
//! // On signal
//! shutdown.shutdown().await;
//! provider.close().await?;
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default drain timeout in seconds
const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 30;

/// Shutdown phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    /// Accepting requests
    Running,
    /// Waiting for in-flight requests
    Draining,
    /// Drain timed out; remaining requests are abandoned
    Terminating,
    /// Shutdown complete
    Terminated,
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Draining => write!(f, "Draining"),
            Self::Terminating => write!(f, "Terminating"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Coordinates request admission and draining
pub struct ShutdownController {
    cancel_token: CancellationToken,
    phase: AtomicU32,
    shutdown_initiated: AtomicBool,
    in_flight: AtomicU32,
    drained: Notify,
    timeout: Duration,
}

impl ShutdownController {
    /// Create a controller with the default drain timeout
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_DRAIN_TIMEOUT_SECS))
    }

    /// Create a controller with a custom drain timeout
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            cancel_token: CancellationToken::new(),
            phase: AtomicU32::new(ShutdownPhase::Running as u32),
            shutdown_initiated: AtomicBool::new(false),
            in_flight: AtomicU32::new(0),
            drained: Notify::new(),
            timeout,
        })
    }

    /// Token cancelled once shutdown starts
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> ShutdownPhase {
        match self.phase.load(Ordering::SeqCst) {
            0 => ShutdownPhase::Running,
            1 => ShutdownPhase::Draining,
            2 => ShutdownPhase::Terminating,
            _ => ShutdownPhase::Terminated,
        }
    }

    /// Whether new requests are admitted
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        !self.shutdown_initiated.load(Ordering::SeqCst)
    }

    /// Admit a request, unless shutdown has started
    pub fn try_begin_request(self: &Arc<Self>) -> Option<RequestGuard> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if !self.is_accepting() {
            self.end_request();
            return None;
        }
        Some(RequestGuard {
            controller: Arc::clone(self),
        })
    }

    /// Requests currently in flight
    #[must_use]
    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn end_request(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }

    fn set_phase(&self, phase: ShutdownPhase) {
        self.phase.store(phase as u32, Ordering::SeqCst);
        info!(phase = %phase, "Shutdown phase changed");
    }

    /// Stop admitting requests and wait for in-flight ones.
    ///
    /// Returns whether every request finished within the timeout. Calls
    /// after the first return immediately.
    pub async fn shutdown(&self) -> bool {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Shutdown already initiated");
            return true;
        }

        info!(in_flight = self.in_flight(), "Initiating graceful shutdown...");
        self.set_phase(ShutdownPhase::Draining);
        self.cancel_token.cancel();

        let drain = async {
            loop {
                let notified = self.drained.notified();
                if self.in_flight() == 0 {
                    break;
                }
                notified.await;
            }
        };

        let clean = match tokio::time::timeout(self.timeout, drain).await {
            Ok(()) => {
                info!("All requests completed");
                true
            }
            Err(_) => {
                warn!(
                    in_flight = self.in_flight(),
                    timeout_secs = self.timeout.as_secs(),
                    "Drain timeout exceeded"
                );
                self.set_phase(ShutdownPhase::Terminating);
                false
            }
        };

        self.set_phase(ShutdownPhase::Terminated);
        clean
    }
}

/// In-flight request marker
///
/// Dropping it lets a pending shutdown proceed.
pub struct RequestGuard {
    controller: Arc<ShutdownController>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.controller.end_request();
    }
}

/// Wait for Ctrl+C or SIGTERM
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_phases() {
        let controller = ShutdownController::new();
        assert_eq!(controller.phase(), ShutdownPhase::Running);
        assert!(controller.is_accepting());

        assert!(controller.shutdown().await);

        assert_eq!(controller.phase(), ShutdownPhase::Terminated);
        assert!(!controller.is_accepting());
    }

    #[tokio::test]
    async fn test_guards_count_in_flight() {
        let controller = ShutdownController::new();
        {
            let _a = controller.try_begin_request().unwrap();
            let _b = controller.try_begin_request().unwrap();
            assert_eq!(controller.in_flight(), 2);
        }
        assert_eq!(controller.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_rejects_after_shutdown() {
        let controller = ShutdownController::new();
        controller.shutdown().await;
        assert!(controller.try_begin_request().is_none());
        assert_eq!(controller.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_drains_in_flight() {
        let controller = ShutdownController::new();
        let guard = controller.try_begin_request().unwrap();
        let token = controller.token();

        let c = Arc::clone(&controller);
        let shutdown = tokio::spawn(async move { c.shutdown().await });

        token.cancelled().await;
        assert_eq!(controller.phase(), ShutdownPhase::Draining);
        assert!(!shutdown.is_finished());

        drop(guard);
        assert!(shutdown.await.unwrap());
        assert_eq!(controller.phase(), ShutdownPhase::Terminated);
    }

    #[tokio::test]
    async fn test_drain_timeout() {
        let controller = ShutdownController::with_timeout(Duration::from_millis(20));
        let _stuck = controller.try_begin_request().unwrap();
        assert!(!controller.shutdown().await);
        assert_eq!(controller.phase(), ShutdownPhase::Terminated);
    }

    #[tokio::test]
    async fn test_double_shutdown() {
        let controller = ShutdownController::new();
        let (a, b) = tokio::join!(controller.shutdown(), controller.shutdown());
        assert!(a && b);
        assert_eq!(controller.phase(), ShutdownPhase::Terminated);
    }
}
