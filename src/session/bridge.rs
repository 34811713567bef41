//! Signal bridge between actors that may live on different runtimes.
//!
//! Messages travel over a crossbeam unbounded channel, so `send` never blocks
//! and works from any thread. A `tokio::sync::Notify` wakes an async receiver
//! regardless of which runtime it is polled on; plain threads can use the
//! blocking `recv_timeout` instead.

use crate::error::{Result, VivaError};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Creates a connected sender/receiver pair.
pub fn signal_bridge<T>() -> (BridgeSender<T>, BridgeReceiver<T>) {
    let (tx, rx) = unbounded();
    let notify = Arc::new(Notify::new());
    (
        BridgeSender {
            tx,
            notify: Arc::clone(&notify),
        },
        BridgeReceiver { rx, notify },
    )
}

/// Sending half. Cheap to clone.
pub struct BridgeSender<T> {
    tx: Sender<T>,
    notify: Arc<Notify>,
}

impl<T> Clone for BridgeSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            notify: Arc::clone(&self.notify),
        }
    }
}

impl<T> BridgeSender<T> {
    /// Enqueues `msg` and wakes the receiver.
    ///
    /// # Errors
    /// `BridgeClosed` when the receiver has been dropped.
    pub fn send(&self, msg: T) -> Result<()> {
        self.tx.send(msg).map_err(|_| VivaError::BridgeClosed)?;
        // notify_one stores a permit, so a receiver that is between try_recv
        // and notified() still wakes up.
        self.notify.notify_one();
        Ok(())
    }

    /// Messages waiting to be received.
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

/// Receiving half. Exactly one per bridge.
pub struct BridgeReceiver<T> {
    rx: Receiver<T>,
    notify: Arc<Notify>,
}

impl<T> BridgeReceiver<T> {
    /// Waits up to `timeout` for the next message without blocking the runtime.
    ///
    /// Returns `None` on timeout. A bridge whose senders are all gone also
    /// yields `None`, after the full timeout, so callers keep their loop cadence.
    pub async fn recv(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.rx.try_recv() {
                Ok(msg) => return Some(msg),
                Err(TryRecvError::Disconnected) => {
                    tokio::time::sleep_until(deadline).await;
                    return None;
                }
                Err(TryRecvError::Empty) => {}
            }
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return self.rx.try_recv().ok();
            }
        }
    }

    /// Blocking receive for callers outside any runtime.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => Some(msg),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let (tx, rx) = signal_bridge();
        for i in 0..5 {
            tx.send(i).unwrap();
        }
        assert_eq!(rx.len(), 5);
        let got: Vec<_> = std::iter::from_fn(|| rx.try_recv()).collect();
        assert_eq!(got, [0, 1, 2, 3, 4]);
        assert!(rx.is_empty());
    }

    #[test]
    fn test_send_after_receiver_dropped_fails() {
        let (tx, rx) = signal_bridge::<u8>();
        drop(rx);
        assert!(matches!(tx.send(1), Err(VivaError::BridgeClosed)));
    }

    #[test]
    fn test_recv_timeout_returns_none_when_idle() {
        let (_tx, rx) = signal_bridge::<u8>();
        assert_eq!(rx.recv_timeout(Duration::from_millis(20)), None);
    }

    #[test]
    fn test_cloned_sender_feeds_same_receiver() {
        let (tx, rx) = signal_bridge();
        let tx2 = tx.clone();
        tx.send("a").unwrap();
        tx2.send("b").unwrap();
        assert_eq!(tx.len(), 2);
        assert_eq!(rx.try_recv(), Some("a"));
        assert_eq!(rx.try_recv(), Some("b"));
    }

    #[tokio::test]
    async fn test_async_recv_times_out() {
        let (_tx, rx) = signal_bridge::<u8>();
        let start = std::time::Instant::now();
        assert_eq!(rx.recv(Duration::from_millis(50)).await, None);
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[tokio::test]
    async fn test_async_recv_wakes_on_send_from_plain_thread() {
        let (tx, rx) = signal_bridge();
        let sender = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            tx.send(42u32).unwrap();
        });
        let start = std::time::Instant::now();
        assert_eq!(rx.recv(Duration::from_secs(5)).await, Some(42));
        assert!(start.elapsed() < Duration::from_secs(2));
        sender.join().unwrap();
    }

    #[test]
    fn test_async_recv_across_runtimes() {
        let (tx, rx) = signal_bridge();
        let receiver = thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let mut got = Vec::new();
                while got.len() < 3 {
                    if let Some(v) = rx.recv(Duration::from_secs(5)).await {
                        got.push(v);
                    }
                }
                got
            })
        });

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            for i in 0..3 {
                tx.send(i).unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });

        assert_eq!(receiver.join().unwrap(), [0, 1, 2]);
    }

    #[tokio::test]
    async fn test_async_recv_on_disconnected_bridge_returns_none() {
        let (tx, rx) = signal_bridge::<u8>();
        drop(tx);
        assert_eq!(rx.recv(Duration::from_millis(10)).await, None);
    }
}
