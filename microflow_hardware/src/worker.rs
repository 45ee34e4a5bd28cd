//! Background update loop shared by all simulated devices.
//!
//! Each `Worker` owns exactly one thread that calls the tick closure once per
//! period until the closure breaks or a halt is requested. The period is paced
//! by `recv_timeout` on the stop channel, so a halt is observed within one
//! tick. The thread announces its exit on a second channel, which lets
//! `halt` wait for quiescence with an upper bound.
use crossbeam_channel as xch;
use std::ops::ControlFlow;
use std::thread::JoinHandle;
use std::time::Duration;

pub(crate) struct Worker {
    stop_tx: xch::Sender<()>,
    done_rx: xch::Receiver<()>,
    join_handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn spawn<F>(name: String, tick: Duration, mut on_tick: F) -> std::io::Result<Self>
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let (stop_tx, stop_rx) = xch::bounded::<()>(1);
        let (done_tx, done_rx) = xch::bounded::<()>(1);

        let join_handle = std::thread::Builder::new()
            .name(name)
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(tick) {
                        Err(xch::RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(xch::RecvTimeoutError::Disconnected) => {
                            tracing::trace!("update loop received halt");
                            break;
                        }
                    }
                    if on_tick().is_break() {
                        tracing::debug!("update loop ended by device");
                        break;
                    }
                }
                let _ = done_tx.send(());
                tracing::trace!("update loop exiting cleanly");
            })?;

        Ok(Self {
            stop_tx,
            done_rx,
            join_handle: Some(join_handle),
        })
    }

    /// Ask the loop to stop and wait up to `timeout` for it to finish.
    /// Returns `false` when the loop did not quiesce in time; the thread is
    /// then left detached and exits on its next tick.
    pub(crate) fn halt(mut self, timeout: Duration) -> bool {
        let _ = self.stop_tx.try_send(());
        match self.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(xch::RecvTimeoutError::Disconnected) => {
                self.join();
                true
            }
            Err(xch::RecvTimeoutError::Timeout) => {
                tracing::warn!(?timeout, "update loop did not quiesce in time");
                self.join_handle.take();
                false
            }
        }
    }

    fn join(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("update loop joined"),
                Err(e) => tracing::warn!(?e, "update loop panicked"),
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let _ = self.stop_tx.try_send(());
        self.join();
    }
}
