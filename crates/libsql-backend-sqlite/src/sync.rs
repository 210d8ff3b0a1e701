//! Background interval sync.
//!
//! A [`SyncTimer`] owns one worker thread that invokes a tick callback every
//! `interval` until it is stopped, dropped, or the callback returns `false`.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

pub struct SyncTimer {
    interval: Duration,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SyncTimer {
    /// Spawn the worker thread.
    pub fn start<F>(interval: Duration, mut tick: F) -> std::io::Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name("libsql-sync".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            if !tick() {
                                break;
                            }
                        }
                        // Stop requested or the owner is gone
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::trace!("sync timer exited");
            })?;

        tracing::debug!(interval_ms = interval.as_millis() as u64, "sync timer started");

        Ok(Self {
            interval,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Is the worker still alive?
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the worker and wait for it to exit. Idempotent.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::warn!("sync timer thread panicked");
            }
        }
    }
}

impl Drop for SyncTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn ticks_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let mut timer = SyncTimer::start(Duration::from_millis(10), move || {
            seen.fetch_add(1, Ordering::SeqCst);
            true
        })
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(count.load(Ordering::SeqCst) >= 3);
        assert!(timer.is_running());

        timer.stop();
        assert!(!timer.is_running());
        let after = count.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(count.load(Ordering::SeqCst), after);
    }

    #[test]
    fn callback_can_end_the_timer() {
        let mut timer = SyncTimer::start(Duration::from_millis(5), || false).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while timer.is_running() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!timer.is_running());
        timer.stop();
    }

    #[test]
    fn stop_is_idempotent() {
        let mut timer = SyncTimer::start(Duration::from_secs(60), || true).unwrap();
        assert_eq!(timer.interval(), Duration::from_secs(60));
        timer.stop();
        timer.stop();
    }
}
