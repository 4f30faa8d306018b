// src/timer.rs
//
// Periodic tick on a dedicated thread.
//
// The scheduling loop must keep running while anything else on the host is
// busy or throttled, so it gets its own thread rather than piggybacking on a
// UI or render loop.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Sender, bounded, select, tick};
use log::{debug, error};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimerError {
    #[error("failed to spawn timer thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Handle to a running tick thread. Stops the thread when dropped.
pub struct Timer {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl Timer {
    /// Call `on_tick` every `interval` with the running tick count.
    pub fn spawn<F>(interval: Duration, mut on_tick: F) -> Result<Self, TimerError>
    where
        F: FnMut(u64) + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let ticker = tick(interval);

        let handle = thread::Builder::new()
            .name("cueline-timer".into())
            .spawn(move || {
                let mut count = 0u64;
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            count += 1;
                            on_tick(count);
                        }
                        // A message or a dropped sender both stop the loop
                        recv(stop_rx) -> _ => break,
                    }
                }
                debug!("timer stopped after {} ticks", count);
            })?;

        debug!("timer started, interval {:?}", interval);

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
            interval,
        })
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop ticking and wait for the thread to exit.
    ///
    /// Returns false if the tick callback panicked.
    pub fn stop(mut self) -> bool {
        self.shutdown()
    }

    fn shutdown(&mut self) -> bool {
        if let Some(stop_tx) = self.stop_tx.take() {
            // The thread is gone already if the callback panicked
            let _ = stop_tx.send(());
        }
        match self.handle.take().map(JoinHandle::join) {
            Some(Err(panic)) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("timer thread panicked: {}", message);
                false
            }
            _ => true,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_ticks_until_stopped() {
        let (tx, rx) = unbounded();
        let timer = Timer::spawn(Duration::from_millis(2), move |count| {
            let _ = tx.send(count);
        })
        .unwrap();

        let first = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!((first, second), (1, 2));
        assert!(timer.is_running());

        timer.stop();
        // Drain anything sent before the stop landed
        while rx.try_recv().is_ok() {}
        assert!(rx.recv_timeout(Duration::from_millis(20)).is_err());
    }

    #[test]
    fn test_panicking_callback_is_reported_on_stop() {
        let timer = Timer::spawn(Duration::from_millis(1), |_| panic!("tick failed")).unwrap();

        for _ in 0..1000 {
            if !timer.is_running() {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!timer.is_running());
        assert!(!timer.stop());
    }

    #[test]
    fn test_clean_stop_reports_success() {
        let timer = Timer::spawn(Duration::from_millis(1), |_| {}).unwrap();
        assert!(timer.stop());
    }
}
