use std::sync::{PoisonError, RwLock};

/// Holder of the latest value of `T`, shared between the producer and the worker.
///
/// Every `write` replaces the whole value under the exclusive lock and every
/// `read` copies it out under the shared lock, so a reader never sees a value
/// that is only partly written. Callers only ever get copies, never references
/// into the shared value.
pub struct DoubleBufferedSlot<T> {
    value: RwLock<T>,
}

impl<T: Clone> DoubleBufferedSlot<T> {
    pub fn new(initial: T) -> Self {
        Self {
            value: RwLock::new(initial),
        }
    }

    /// Replace the stored value.
    pub fn write(&self, value: T) {
        let previous = {
            let mut guard = self.value.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *guard, value)
        };
        // Old value is dropped outside the lock.
        drop(previous);
    }

    /// Copy of the current value.
    pub fn read(&self) -> T {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<T: Clone + Default> Default for DoubleBufferedSlot<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[derive(Clone, Default)]
    struct Frame {
        seq: u64,
        doubled: u64,
        label: String,
    }

    impl Frame {
        fn new(seq: u64) -> Self {
            Self {
                seq,
                doubled: seq * 2,
                label: format!("frame-{seq}"),
            }
        }

        fn is_consistent(&self) -> bool {
            self.doubled == self.seq * 2 && self.label == format!("frame-{}", self.seq)
        }
    }

    #[test]
    fn read_returns_latest_write() {
        let slot = DoubleBufferedSlot::new(1u32);
        slot.write(7);
        slot.write(9);
        assert_eq!(slot.read(), 9);
    }

    #[test]
    fn default_uses_type_default() {
        let slot: DoubleBufferedSlot<Vec<u8>> = DoubleBufferedSlot::default();
        assert!(slot.read().is_empty());
    }

    #[test]
    fn concurrent_reads_never_observe_torn_values() {
        let slot = Arc::new(DoubleBufferedSlot::new(Frame::new(0)));
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let slot = Arc::clone(&slot);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                for seq in 1..=20_000 {
                    slot.write(Frame::new(seq));
                }
                done.store(true, Ordering::Release);
            })
        };

        let mut last_seq = 0;
        while !done.load(Ordering::Acquire) {
            let frame = slot.read();
            assert!(frame.is_consistent(), "torn read at seq {}", frame.seq);
            assert!(frame.seq >= last_seq, "slot went backwards");
            last_seq = frame.seq;
        }
        writer.join().unwrap();
        assert_eq!(slot.read().seq, 20_000);
    }
}
