//! Cooperative cancellation.
//!
//! Every operation has a cancellable variant taking a [`CancellationToken`].
//! The engine checks the token at each I/O boundary before touching the
//! backend; execution adapters should additionally `select!` on the token's
//! channel against their own I/O so an in-flight read aborts promptly.
//!
//! Cancellation observed at a suspend point surfaces as
//! `ExecutionError::Cancelled` and guarantees the pending statement was not
//! partially applied.

use crossbeam_channel::{bounded, Receiver, Sender};
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The signalling half. Cancelling is idempotent; dropping the canceller
/// without cancelling leaves the token live forever.
pub struct Canceller {
    flag: Arc<AtomicBool>,
    tx: Sender<()>,
}

impl Canceller {
    /// Fire the signal. Safe to call more than once.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        // Wake one blocked select; the flag covers everyone else.
        let _ = self.tx.try_send(());
    }
}

/// The observing half, passed into cancellable operations. Cheap to clone.
#[derive(Clone)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    rx: Receiver<()>,
}

impl CancellationToken {
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// The channel adapters can `select!` on against their own I/O.
    pub fn channel(&self) -> &Receiver<()> {
        &self.rx
    }

    /// A token that never fires, used by the blocking call forms.
    pub fn none() -> Self {
        static NEVER: Lazy<(Canceller, CancellationToken)> = Lazy::new(cancellation_pair);
        NEVER.1.clone()
    }
}

/// Create a linked canceller/token pair.
pub fn cancellation_pair() -> (Canceller, CancellationToken) {
    let flag = Arc::new(AtomicBool::new(false));
    let (tx, rx) = bounded(1);
    (
        Canceller {
            flag: Arc::clone(&flag),
            tx,
        },
        CancellationToken { flag, rx },
    )
}
