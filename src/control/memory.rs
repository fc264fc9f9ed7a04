//! In-memory control channel.
//!
//! Keeps the set of live pipeline names the way the daemon would, records
//! every request in order, and rejects requests matched by injected
//! failure rules. Used for rehearsals without a daemon and by tests.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::{BoxFuture, Connector, ControlChannel, ControlRequest, Endpoint};

type FailureRule = Box<dyn Fn(&ControlRequest) -> bool + Send + Sync>;

#[derive(Default)]
struct State {
    pipelines: BTreeSet<String>,
    log: Vec<ControlRequest>,
}

/// In-memory stand-in for a connected daemon.
#[derive(Default)]
pub struct MemoryChannel {
    state: Mutex<State>,
    rules: Mutex<Vec<FailureRule>>,
}

impl std::fmt::Debug for MemoryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryChannel")
            .field("pipelines", &self.pipelines())
            .finish_non_exhaustive()
    }
}

impl MemoryChannel {
    /// Create an empty channel.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reject every future request for which `rule` returns `true`.
    pub fn fail_when(&self, rule: impl Fn(&ControlRequest) -> bool + Send + Sync + 'static) {
        lock(&self.rules).push(Box::new(rule));
    }

    /// Every request received so far, in arrival order, including
    /// rejected ones.
    #[must_use]
    pub fn requests(&self) -> Vec<ControlRequest> {
        lock(&self.state).log.clone()
    }

    /// Names of pipelines currently held.
    #[must_use]
    pub fn pipelines(&self) -> Vec<String> {
        lock(&self.state).pipelines.iter().cloned().collect()
    }

    fn apply(&self, request: &ControlRequest) -> Result<(), String> {
        let mut state = lock(&self.state);
        state.log.push(request.clone());

        if lock(&self.rules).iter().any(|rule| rule(request)) {
            return Err(format!("injected failure for {}", request.operation()));
        }

        let name = request.pipeline();
        match request {
            ControlRequest::Create { .. } => {
                if !state.pipelines.insert(name.to_owned()) {
                    return Err(format!("pipeline '{name}' already exists"));
                }
            }
            ControlRequest::Delete { .. } => {
                if !state.pipelines.remove(name) {
                    return Err(format!("pipeline '{name}' does not exist"));
                }
            }
            _ => {
                if !state.pipelines.contains(name) {
                    return Err(format!("pipeline '{name}' does not exist"));
                }
            }
        }
        Ok(())
    }
}

impl ControlChannel for MemoryChannel {
    fn execute(&self, request: ControlRequest) -> BoxFuture<'_, Result<(), String>> {
        Box::pin(async move {
            let outcome = self.apply(&request);
            debug!(?request, ok = outcome.is_ok(), "memory channel request");
            outcome
        })
    }
}

/// Connector handing out a shared [`MemoryChannel`].
///
/// Optionally refuses the first few connection attempts.
#[derive(Debug)]
pub struct MemoryConnector {
    channel: Arc<MemoryChannel>,
    refusals_left: AtomicU32,
    attempts: AtomicU32,
}

impl MemoryConnector {
    /// Connector that always succeeds.
    #[must_use]
    pub fn new(channel: Arc<MemoryChannel>) -> Self {
        Self::refusing(channel, 0)
    }

    /// Connector that refuses the first `refusals` attempts.
    #[must_use]
    pub fn refusing(channel: Arc<MemoryChannel>, refusals: u32) -> Self {
        Self {
            channel,
            refusals_left: AtomicU32::new(refusals),
            attempts: AtomicU32::new(0),
        }
    }

    /// Number of connection attempts made so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for MemoryConnector {
    fn connect<'a>(
        &'a self,
        endpoint: &'a Endpoint,
    ) -> BoxFuture<'a, Result<Arc<dyn ControlChannel>, String>> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let refused = self
                .refusals_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(format!("connection refused by {endpoint}"));
            }
            let channel: Arc<dyn ControlChannel> = self.channel.clone();
            Ok(channel)
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
