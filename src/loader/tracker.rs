//! Convergence tracking for factory scans
//!
//! Every factory the host knows about, plus every factory it registers while
//! we run, gets one scan pipeline. Pipelines are counted: scheduling bumps
//! the counter, the pipeline's guard drops it when the pipeline settles, and
//! the scan is converged the moment the counter is observed at zero.
//!
//! A factory registered by a pipeline (through `ensure_chunk` or `require`)
//! is scheduled synchronously from the host's listener, before that
//! pipeline's own guard is released, so the counter cannot pass through zero
//! while work is still outstanding.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::debug;

use super::{classify, ModuleId, Session};

/// Counts pipelines that have been scheduled but have not settled
#[derive(Clone)]
pub struct Convergence {
    pending: Arc<watch::Sender<usize>>,
}

impl Convergence {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { pending: Arc::new(tx) }
    }

    /// Register one outstanding pipeline; it settles when the guard drops
    pub fn schedule(&self) -> PipelineGuard {
        self.pending.send_modify(|n| *n += 1);
        PipelineGuard {
            pending: self.pending.clone(),
        }
    }

    /// Number of pipelines not yet settled
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Resolve once no pipeline is outstanding
    pub async fn wait(&self) {
        let mut rx = self.pending.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for Convergence {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks one pipeline as outstanding until dropped
pub struct PipelineGuard {
    pending: Arc<watch::Sender<usize>>,
}

impl Drop for PipelineGuard {
    fn drop(&mut self) {
        self.pending.send_modify(|n| *n -= 1);
    }
}

/// Schedules one scan pipeline per observed factory
struct Tracker {
    session: Arc<Session>,
    convergence: Convergence,
    runtime: Handle,
}

impl Tracker {
    fn observe(&self, module: ModuleId, source: &str) {
        let guard = self.convergence.schedule();
        let session = self.session.clone();
        let source = source.to_string();

        self.runtime.spawn(async move {
            let _guard = guard;
            classify::scan_factory(&session, module, &source).await;
        });
    }
}

/// Scan every existing and newly registered factory until all scans settle.
///
/// Panics outside a tokio runtime, since pipelines are spawned onto it.
pub(super) async fn scan_until_converged(session: Arc<Session>) {
    let tracker = Arc::new(Tracker {
        session: session.clone(),
        convergence: Convergence::new(),
        runtime: Handle::current(),
    });

    // Subscribe before the snapshot so nothing registered in between is missed
    let listener = {
        let tracker = tracker.clone();
        session
            .host
            .add_factory_listener(Arc::new(move |module: ModuleId, source: &str| {
                tracker.observe(module, source)
            }))
    };

    let factories = session.host.factories();
    debug!("Scanning {} registered factories", factories.len());
    for (module, source) in &factories {
        tracker.observe(*module, source);
    }

    tracker.convergence.wait().await;
    session.host.remove_factory_listener(listener);

    debug!("All factory scans settled");
}
