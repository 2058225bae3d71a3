//! Notification Dispatcher (C5): a single sender task draining a bounded
//! FIFO queue, rate-limited to one external send per 2 seconds, with a
//! side-channel clear-queue operation that never blocks on the send loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::models::AlertMessage;
use crate::notifier::Notifier;

const QUEUE_CAPACITY: usize = 100;
const MIN_INTER_SEND: Duration = Duration::from_secs(2);

enum Control {
    ClearQueue(oneshot::Sender<usize>),
}

/// Handle held by the Orchestrator and HTTP layer to talk to the running
/// sender task. Cloning is cheap; all clones share the same queue.
#[derive(Clone)]
pub struct DispatcherHandle {
    messages: mpsc::Sender<AlertMessage>,
    control: mpsc::UnboundedSender<Control>,
}

impl DispatcherHandle {
    /// Non-blocking enqueue. Drops the message with a warning if the queue
    /// is at capacity; never awaits.
    pub fn enqueue(&self, message: AlertMessage) {
        if let Err(err) = self.messages.try_send(message) {
            match err {
                mpsc::error::TrySendError::Full(_) => {
                    warn!("dispatcher queue full, dropping alert");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    warn!("dispatcher closed, dropping alert");
                }
            }
        }
    }

    /// Drains pending messages without sending them. Returns the number
    /// dropped. Safe to call concurrently with the running sender loop.
    pub async fn clear_queue(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self.control.send(Control::ClearQueue(tx)).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Runs the sender loop until `shutdown` fires, then drains and returns.
/// Spawn onto its own task; communicate via the returned [`DispatcherHandle`].
pub fn spawn(notifier: Arc<dyn Notifier>, mut shutdown: watch::Receiver<bool>) -> (DispatcherHandle, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<AlertMessage>(QUEUE_CAPACITY);
    let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<Control>();

    let handle = DispatcherHandle {
        messages: tx,
        control: ctrl_tx,
    };

    let join = tokio::spawn(async move {
        let mut last_send: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }

                Some(ctrl) = ctrl_rx.recv() => {
                    match ctrl {
                        Control::ClearQueue(reply) => {
                            let mut drained = 0usize;
                            while rx.try_recv().is_ok() {
                                drained += 1;
                            }
                            info!(drained, "dispatcher queue cleared");
                            let _ = reply.send(drained);
                        }
                    }
                }

                maybe_msg = rx.recv() => {
                    let Some(message) = maybe_msg else { break };

                    if let Some(last) = last_send {
                        let elapsed = last.elapsed();
                        if elapsed < MIN_INTER_SEND {
                            let remaining = MIN_INTER_SEND - elapsed;
                            tokio::select! {
                                _ = tokio::time::sleep(remaining) => {}
                                _ = shutdown.changed() => {
                                    if *shutdown.borrow() {
                                        break;
                                    }
                                }
                            }
                        }
                    }

                    let text = message.render();
                    match notifier.send(&text).await {
                        Ok(()) => info!("alert dispatched"),
                        Err(err) => warn!(error = %err, "alert send failed, not re-queued"),
                    }
                    last_send = Some(Instant::now());
                }
            }
        }

        // Drain whatever is left without sending, honoring shutdown.
        let mut dropped = 0usize;
        while rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            info!(dropped, "dispatcher drained remaining queue on shutdown");
        }
    });

    (handle, join)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingNotifier {
        sent: AtomicUsize,
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn send(&self, _text: &str) -> anyhow::Result<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn s6_enqueue_200_drops_excess_at_capacity() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let notifier = Arc::new(CountingNotifier { sent: AtomicUsize::new(0) });
        let (handle, join) = spawn(notifier, shutdown_rx);

        // Stuff the queue before the sender has a chance to drain it by
        // immediately clearing it, so we can observe backpressure directly.
        let cleared = handle.clear_queue().await;
        assert_eq!(cleared, 0);

        for _ in 0..200 {
            handle.enqueue(AlertMessage::Test("x".into()));
        }
        // At most QUEUE_CAPACITY can be resident at any instant; the rest
        // were rejected by try_send already (drop-on-full, not batched).
        let drained = handle.clear_queue().await;
        assert!(drained <= QUEUE_CAPACITY);

        join.abort();
    }

    #[tokio::test]
    async fn pacing_enforces_minimum_interval_between_sends() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let notifier = Arc::new(CountingNotifier { sent: AtomicUsize::new(0) });
        let (handle, join) = spawn(notifier.clone(), shutdown_rx);

        let start = Instant::now();
        handle.enqueue(AlertMessage::Test("a".into()));
        handle.enqueue(AlertMessage::Test("b".into()));

        tokio::time::sleep(Duration::from_millis(2200)).await;
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 2);
        assert!(start.elapsed() >= MIN_INTER_SEND);

        let _ = shutdown_tx.send(true);
        let _ = join.await;
    }
}
