use parking_lot::RwLock;
use tokio::sync::Notify;

/// One-shot broadcast: starts closed, opens exactly once with a value, and
/// every waiter (past or future) observes that value.
pub struct ReadinessGate<T> {
    value: RwLock<Option<T>>,
    notify: Notify,
}

impl<T: Clone + Send + Sync> ReadinessGate<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            value: RwLock::new(None),
            notify: Notify::new(),
        }
    }

    /// Opens the gate. Hands `value` back if it was already open.
    pub fn open(&self, value: T) -> Result<(), T> {
        let mut slot = self.value.write();
        if slot.is_some() {
            return Err(value);
        }
        *slot = Some(value);
        drop(slot);
        self.notify.notify_waiters();
        Ok(())
    }

    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.value.read().clone()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.value.read().is_some()
    }

    /// Suspends until the gate opens.
    pub async fn wait(&self) -> T {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so an `open` in between is not missed.
            notified.as_mut().enable();
            if let Some(value) = self.get() {
                return value;
            }
            notified.await;
        }
    }
}

impl<T: Clone + Send + Sync> Default for ReadinessGate<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio::time::timeout;

    use super::*;

    #[tokio::test]
    async fn waiters_block_until_opened() {
        let gate = Arc::new(ReadinessGate::<u32>::new());
        let waiters: Vec<_> = (0..16)
            .map(|_| {
                let gate = Arc::clone(&gate);
                tokio::spawn(async move { gate.wait().await })
            })
            .collect();

        tokio::task::yield_now().await;
        assert!(!gate.is_open());
        assert!(
            timeout(Duration::from_millis(20), gate.wait())
                .await
                .is_err()
        );

        gate.open(7).unwrap();
        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), 7);
        }
        assert_eq!(gate.wait().await, 7);
    }

    #[test]
    fn opens_exactly_once() {
        let gate = ReadinessGate::new();
        assert_eq!(gate.open("first"), Ok(()));
        assert_eq!(gate.open("second"), Err("second"));
        assert_eq!(gate.get(), Some("first"));
    }
}
