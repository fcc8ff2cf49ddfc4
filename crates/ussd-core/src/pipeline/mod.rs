//! Per-request protocol
//!
//! Every inbound keystroke goes through three phases:
//!
//! 1. **process**: check out the session and run one interpreter step
//! 2. **output**: write the produced screen to the response sink
//! 3. **reset**: check the session back in
//!
//! The lease taken in `process` is put back exactly once whatever phase
//! fails. [`SessionPipeline::run`] composes the three phases for callers
//! that do not need to interleave their own work.

use crate::error::{Error, Result};
use crate::provider::{SessionBundle, SessionLease, StorageProvider};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, warn};


/// Result of one interpreter step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOutcome {
    /// Whether the step rendered a screen to flush
    pub produces_output: bool,
    /// Whether the session expects more input
    pub continues: bool,
}

impl StepOutcome {
    /// A rendered screen, continuing or final
    #[must_use]
    pub fn screen(continues: bool) -> Self {
        Self {
            produces_output: true,
            continues,
        }
    }
}

/// The menu interpreter, as seen by the pipeline
#[async_trait]
pub trait Interpreter: Send + Sync {
    /// Advance the session by one input
    async fn step(&self, session_id: &str, bundle: &mut SessionBundle, input: &[u8]) -> Result<StepOutcome>;

    /// Write the rendered screen to `sink`, returning the bytes written
    async fn flush(&self, bundle: &SessionBundle, sink: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<usize>;
}

/// State of one request as it moves through the pipeline
#[derive(Debug)]
pub struct RequestSession {
    session_id: String,
    input: Vec<u8>,
    continues: bool,
    produces_output: bool,
    lease: Option<SessionLease>,
}

impl RequestSession {
    /// New request for `session_id` carrying `input`
    pub fn new(session_id: impl Into<String>, input: impl Into<Vec<u8>>) -> Self {
        Self {
            session_id: session_id.into(),
            input: input.into(),
            continues: false,
            produces_output: false,
            lease: None,
        }
    }

    /// Session id
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether the last step expects more input
    pub fn continues(&self) -> bool {
        self.continues
    }

    /// Whether a lease is still checked out
    pub fn is_checked_out(&self) -> bool {
        self.lease.is_some()
    }
}

/// Runs requests against a storage provider and an interpreter
#[derive(Clone)]
pub struct SessionPipeline {
    provider: Arc<dyn StorageProvider>,
    interpreter: Arc<dyn Interpreter>,
    markers: Option<(String, String)>,
}

impl SessionPipeline {
    /// Create a pipeline that writes the bare screen
    pub fn new(provider: Arc<dyn StorageProvider>, interpreter: Arc<dyn Interpreter>) -> Self {
        Self {
            provider,
            interpreter,
            markers: None,
        }
    }

    /// Prefix output with `more` while the session continues and `last` on
    /// the final screen
    #[must_use]
    pub fn with_markers(mut self, more: impl Into<String>, last: impl Into<String>) -> Self {
        self.markers = Some((more.into(), last.into()));
        self
    }

    /// Provider this pipeline leases from
    pub fn provider(&self) -> &Arc<dyn StorageProvider> {
        &self.provider
    }

    /// Check out the session and run one step.
    ///
    /// On a failed step the lease is put back before the error is returned.
    pub async fn process(&self, request: &mut RequestSession) -> Result<bool> {
        let mut lease = self.provider.get(&request.session_id).await.map_err(|e| match e {
            busy_or_storage @ (Error::SessionBusy(_) | Error::Storage(_)) => busy_or_storage,
            other => Error::Storage(other.to_string()),
        })?;

        let step = self
            .interpreter
            .step(&request.session_id, lease.bundle_mut(), &request.input)
            .await;

        match step {
            Ok(outcome) => {
                request.continues = outcome.continues;
                request.produces_output = outcome.produces_output;
                request.lease = Some(lease);
                debug!(session_id = %request.session_id, continues = outcome.continues, "Step complete");
                Ok(outcome.continues)
            }
            Err(e) => {
                error!(session_id = %request.session_id, error = %e, "Interpreter step failed");
                if let Err(put_err) = self.provider.put(lease).await {
                    warn!(session_id = %request.session_id, error = %put_err, "Failed to put back session after step error");
                }
                Err(e)
            }
        }
    }

    /// Write the screen produced by [`process`](Self::process).
    ///
    /// The marker is written even when the step rendered nothing.
    pub async fn output(
        &self,
        request: &RequestSession,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<usize> {
        let lease = request
            .lease
            .as_ref()
            .ok_or_else(|| Error::Storage(format!("no session checked out for {}", request.session_id)))?;

        let mut written = 0;
        if let Some((more, last)) = &self.markers {
            let marker = if request.continues { more } else { last };
            sink.write_all(marker.as_bytes()).await?;
            written += marker.len();
        }
        if request.produces_output {
            written += self.interpreter.flush(lease.bundle(), sink).await?;
        }
        sink.flush().await?;
        Ok(written)
    }

    /// Put back the lease. Does nothing when it was already put back.
    pub async fn reset(&self, request: &mut RequestSession) -> Result<()> {
        match request.lease.take() {
            Some(lease) => self.provider.put(lease).await,
            None => Ok(()),
        }
    }

    /// All three phases; returns whether the session continues
    pub async fn run(
        &self,
        session_id: &str,
        input: &[u8],
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<bool> {
        let mut request = RequestSession::new(session_id, input);
        let continues = self.process(&mut request).await?;

        let output = self.output(&request, sink).await;
        let reset = self.reset(&mut request).await;

        output?;
        reset?;
        Ok(continues)
    }

    /// Release the provider's backends
    pub async fn close(&self) -> Result<()> {
        self.provider.close().await
    }
}
