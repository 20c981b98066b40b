use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Outcome of [`WakeSignal::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// Run one worker cycle.
    Cycle,
    /// Stop was requested; exit the loop.
    Stop,
}

#[derive(Debug, Default)]
struct SignalState {
    pending: bool,
    stop: bool,
}

/// Binary wake event between the producer and the worker thread.
///
/// Signals coalesce: any number of `signal()` calls before a `wait()` release
/// exactly one wait. A signal with no waiter primes the next wait.
#[derive(Debug, Default)]
pub struct WakeSignal {
    state: Mutex<SignalState>,
    condvar: Condvar,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn signal(&self) {
        self.lock().pending = true;
        self.condvar.notify_one();
    }

    /// Latch the stop flag and wake any waiter.
    pub fn request_stop(&self) {
        {
            let mut state = self.lock();
            state.stop = true;
            state.pending = true;
        }
        self.condvar.notify_all();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.lock().stop
    }

    /// Block until a signal is pending or stop is requested.
    ///
    /// Stop wins over a pending cycle and is checked before blocking and on
    /// every wakeup.
    pub fn wait(&self) -> Wake {
        let mut state = self.lock();
        loop {
            if state.stop {
                return Wake::Stop;
            }
            if state.pending {
                state.pending = false;
                return Wake::Cycle;
            }
            state = self
                .condvar
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}
