//! Request coalescing.
//!
//! Concurrent identical calls share one execution. A call is identified by
//! its method name and the SHA-256 of its serialized request. The first
//! caller spawns the operation on its own task; callers arriving with the
//! same fingerprint before it finishes wait for the same outcome. A caller
//! giving up (deadline or cancellation) only releases that caller.

use crate::rpc::RpcError;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

type Outcome = Result<Arc<dyn Any + Send + Sync>, RpcError>;
type InFlight = HashMap<String, watch::Receiver<Option<Outcome>>>;

/// Per-call deadline and cancellation
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl CallContext {
    /// A call that is cancelled together with `cancel`
    #[must_use]
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            deadline: None,
            cancel,
        }
    }

    /// Sets the deadline to `timeout` from now
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Waits for `future` unless the call is cancelled or runs out of time first
    pub async fn wait<F: Future>(&self, future: F) -> Result<F::Output, RpcError> {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(RpcError::Cancelled),
            () = deadline => Err(RpcError::DeadlineExceeded),
            output = future => Ok(output),
        }
    }
}

/// Deduplicates concurrent identical calls
#[derive(Debug, Clone, Default)]
pub struct Coalescer {
    inflight: Arc<Mutex<InFlight>>,
}

/// Removes the in-flight entry when the operation task ends, even on panic
struct Retire {
    inflight: Arc<Mutex<InFlight>>,
    key: String,
}

impl Drop for Retire {
    fn drop(&mut self) {
        lock(&self.inflight).remove(&self.key);
    }
}

fn lock(inflight: &Mutex<InFlight>) -> MutexGuard<'_, InFlight> {
    inflight.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Coalescing key of a request: `<method>-<hex sha256 of its JSON>`
pub fn fingerprint<Req: Serialize>(method: &str, request: &Req) -> Result<String, RpcError> {
    let bytes = serde_json::to_vec(request)
        .map_err(|e| RpcError::Internal(format!("failed to serialize request: {e}")))?;
    Ok(format!("{method}-{}", hex::encode(Sha256::digest(&bytes))))
}

impl Coalescer {
    /// Coalescer with nothing in flight
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations currently running
    #[cfg(test)]
    pub fn in_flight(&self) -> usize {
        lock(&self.inflight).len()
    }

    /// Runs `operation` for `request`, or joins an identical call already running
    ///
    /// `operation` is only invoked when no identical call is in flight.
    pub async fn run<Req, T, F, Fut>(
        &self,
        method: &'static str,
        request: &Req,
        ctx: &CallContext,
        operation: F,
    ) -> Result<T, RpcError>
    where
        Req: Serialize,
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RpcError>> + Send + 'static,
    {
        let key = fingerprint(method, request)?;
        let mut outcome = self.join_or_start(key, operation);

        let published = ctx
            .wait(outcome.wait_for(Option::is_some))
            .await?
            .map(|published| (*published).clone())
            .map_err(|_| RpcError::Internal(format!("{method} aborted before completing")))?;

        match published {
            Some(Ok(value)) => value.downcast_ref::<T>().cloned().ok_or_else(|| {
                RpcError::Internal(format!("unexpected result type for {method}"))
            }),
            Some(Err(err)) => Err(err),
            None => Err(RpcError::Internal(format!("{method} produced no result"))),
        }
    }

    fn join_or_start<T, F, Fut>(&self, key: String, operation: F) -> watch::Receiver<Option<Outcome>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RpcError>> + Send + 'static,
    {
        let mut inflight = lock(&self.inflight);
        if let Some(outcome) = inflight.get(&key) {
            debug!(fingerprint = %key, "joining in-flight call");
            return outcome.clone();
        }

        let (tx, rx) = watch::channel(None);
        inflight.insert(key.clone(), rx.clone());
        drop(inflight);

        let retire = Retire {
            inflight: Arc::clone(&self.inflight),
            key,
        };
        let future = operation();
        tokio::spawn(async move {
            let outcome: Outcome = future
                .await
                .map(|value| Arc::new(value) as Arc<dyn Any + Send + Sync>);
            // Retire first so a call arriving after publication starts afresh
            drop(retire);
            tx.send_replace(Some(outcome));
        });

        rx
    }
}
