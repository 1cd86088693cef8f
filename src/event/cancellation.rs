use std::mem;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

/// Builds a one-shot cancellation pair. The handle side closes the signal,
/// the signal side observes it. Closing is idempotent and never blocks;
/// any number of signal clones observe the same closure.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = bounded::<()>(0);
    (CancelHandle(Mutex::new(Some(tx))), CancelSignal(rx))
}

/// Closing side of a cancellation pair. Single logical writer; the first
/// `close` wins and later calls are no-ops.
pub struct CancelHandle(Mutex<Option<Sender<()>>>);

impl CancelHandle {
    pub fn close(&self) {
        // Dropping the only sender disconnects the channel, which is what
        // the observers wait for. Nothing is ever sent through it.
        self.0.lock().unwrap().take();
    }

    pub fn is_closed(&self) -> bool {
        self.0.lock().unwrap().is_none()
    }
}

/// Observing side of a cancellation pair.
#[derive(Clone)]
pub struct CancelSignal(Receiver<()>);

impl CancelSignal {
    pub fn is_closed(&self) -> bool {
        matches!(self.0.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Blocks until the signal is closed or `timeout` elapses.
    /// Returns true if the signal was closed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        matches!(
            self.0.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }

    /// Blocks until the signal is closed.
    pub fn wait(&self) {
        let _ = self.0.recv();
    }

    /// Raw receiver, for `select!` arms.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.0
    }

    /// A signal that closes on its own once `timeout` elapses. Models a
    /// deadline for operations such as shutdown.
    pub fn deadline(timeout: Duration) -> CancelSignal {
        let (handle, signal) = cancel_pair();
        thread::spawn(move || {
            thread::sleep(timeout);
            handle.close();
        });
        signal
    }

    /// A signal that never closes.
    pub fn never() -> CancelSignal {
        let (tx, rx) = bounded::<()>(0);
        mem::forget(tx);
        CancelSignal(rx)
    }
}
