//! Per-session background worker
//!
//! Receives device callbacks off the host's sequencing context and feeds
//! them to the controller one at a time. Also owns the device-open deadline.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::controller::Inner;
use crate::device::DeviceEvent;

/// Error code reported when the provider abandons an open request
pub(crate) const CALLBACKS_DROPPED: i32 = -1;

/// Handle to a running background worker
///
/// Dropping the handle also signals shutdown.
pub(crate) struct BackgroundWorker {
    generation: u64,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl BackgroundWorker {
    /// Spawn the worker for session `generation`
    pub(crate) fn spawn(
        generation: u64,
        events: mpsc::UnboundedReceiver<DeviceEvent>,
        open_timeout: Option<Duration>,
        controller: Weak<Inner>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run(
            generation,
            events,
            shutdown_rx,
            open_timeout,
            controller,
        ));
        tracing::debug!(generation, "Background worker started");

        Self {
            generation,
            shutdown_tx: Some(shutdown_tx),
            handle,
        }
    }

    fn signal_shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Signal shutdown without waiting
    ///
    /// Used when the worker itself triggered the teardown; its loop exits
    /// once the current event has been handled.
    pub(crate) fn detach(mut self) {
        self.signal_shutdown();
        tracing::debug!(generation = self.generation, "Background worker detached");
    }

    /// Signal shutdown and wait for the worker to exit
    ///
    /// Must not be called with the controller's state lock held.
    pub(crate) async fn quit(mut self, join_timeout: Duration) {
        self.signal_shutdown();

        match tokio::time::timeout(join_timeout, &mut self.handle).await {
            Ok(Ok(())) => {
                tracing::debug!(generation = self.generation, "Background worker joined");
            }
            Ok(Err(e)) => {
                tracing::warn!(generation = self.generation, "Background worker failed: {}", e);
            }
            Err(_) => {
                tracing::warn!(
                    generation = self.generation,
                    timeout_ms = join_timeout.as_millis() as u64,
                    "Background worker did not exit in time, aborting"
                );
                self.handle.abort();
            }
        }
    }
}

async fn run(
    generation: u64,
    mut events: mpsc::UnboundedReceiver<DeviceEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
    open_timeout: Option<Duration>,
    controller: Weak<Inner>,
) {
    let open_deadline = tokio::time::sleep(open_timeout.unwrap_or_default());
    tokio::pin!(open_deadline);
    let mut awaiting_open = open_timeout.is_some();
    let mut opened = false;

    loop {
        tokio::select! {
            biased;

            // Fires on an explicit signal and when the handle is dropped
            _ = &mut shutdown_rx => break,

            _ = &mut open_deadline, if awaiting_open => {
                awaiting_open = false;
                let Some(inner) = controller.upgrade() else { break };
                inner.device_open_timed_out(generation).await;
            }

            event = events.recv() => {
                let Some(inner) = controller.upgrade() else { break };
                match event {
                    Some(event) => {
                        awaiting_open = false;
                        if matches!(event, DeviceEvent::Opened(_)) {
                            opened = true;
                        }
                        inner.device_event(generation, event).await;
                    }
                    None => {
                        // Provider dropped every callback handle
                        if !opened {
                            inner.device_error(generation, CALLBACKS_DROPPED).await;
                        }
                        break;
                    }
                }
            }
        }
    }

    tracing::debug!(generation, "Background worker exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceCallbacks;

    #[tokio::test]
    async fn test_quit_joins_idle_worker() {
        let (_callbacks, events) = DeviceCallbacks::channel(1);
        let worker = BackgroundWorker::spawn(1, events, None, Weak::new());

        tokio::time::timeout(Duration::from_secs(1), worker.quit(Duration::from_secs(1)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_exits_once_controller_is_gone() {
        let (callbacks, events) = DeviceCallbacks::channel(1);
        let mut worker = BackgroundWorker::spawn(1, events, None, Weak::new());

        callbacks.error(3);

        tokio::time::timeout(Duration::from_secs(1), &mut worker.handle)
            .await
            .unwrap()
            .unwrap();
        assert!(callbacks.is_closed());
    }

    #[tokio::test]
    async fn test_dropping_handle_stops_worker() {
        let (callbacks, events) = DeviceCallbacks::channel(1);
        let worker = BackgroundWorker::spawn(1, events, Some(Duration::from_secs(60)), Weak::new());

        drop(worker);

        for _ in 0..50 {
            if callbacks.is_closed() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(callbacks.is_closed());
    }
}
