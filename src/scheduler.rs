// src/scheduler.rs
//! Dual-thread scheduler.
//!
//! One dedicated physics thread steps the world while the render thread
//! draws. The two meet through a handful of atomics:
//!
//! * the render thread is the only writer of the delta and of
//!   `update_requested`;
//! * the physics thread is the only writer of `done` and `faulted` and the
//!   only one that clears `update_requested`;
//! * `quit` is raised by the render thread and observed between steps only.
//!
//! The render thread clears `done` after it has observed it, so a completed
//! step is reported exactly once.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::utils::Backoff;

use crate::config::SchedulerConfig;
use crate::error::{Error, Result};

/// Idle sleep once the backoff has stopped spinning.
const IDLE_SLEEP: Duration = Duration::from_micros(50);

#[derive(Debug, Default)]
struct FrameSync {
    delta_bits: AtomicU32,
    update_requested: AtomicBool,
    done: AtomicBool,
    quit: AtomicBool,
    faulted: AtomicBool,
}

/// Handle to the running physics thread. Owned by the render thread.
pub struct PhysicsThread {
    sync: Arc<FrameSync>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl PhysicsThread {
    /// Start the physics thread. `step` runs once per request with the
    /// requested delta in milliseconds.
    pub fn spawn<F>(config: SchedulerConfig, step: F) -> Result<Self>
    where
        F: FnMut(f32) -> Result<()> + Send + 'static,
    {
        let sync = Arc::new(FrameSync::default());
        let thread_sync = Arc::clone(&sync);
        let name = config.thread_name.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || physics_loop(&thread_sync, &config, step))?;
        log::debug!("physics thread '{name}' started");
        Ok(Self {
            sync,
            handle: Some(handle),
        })
    }

    /// Publish `delta_ms` and ask for one step. Call [`wait_for_done`](Self::wait_for_done)
    /// before requesting again.
    pub fn request_update(&self, delta_ms: f32) {
        self.sync
            .delta_bits
            .store(delta_ms.to_bits(), Ordering::Relaxed);
        self.sync.update_requested.store(true, Ordering::Release);
    }

    /// Whether the last requested step has finished and not yet been waited on.
    pub fn is_done(&self) -> bool {
        self.sync.done.load(Ordering::Acquire)
    }

    /// Whether the physics thread stopped on a step error.
    pub fn is_faulted(&self) -> bool {
        self.sync.faulted.load(Ordering::Acquire)
    }

    /// Block until the requested step completes, then clear `done`.
    ///
    /// There is no timeout: a physics step that never returns stalls the
    /// caller. A step that fails or panics ends the wait with its error.
    pub fn wait_for_done(&mut self) -> Result<()> {
        let backoff = Backoff::new();
        loop {
            if self.sync.done.load(Ordering::Acquire) {
                break;
            }
            let finished = self.handle.as_ref().map_or(true, |h| h.is_finished());
            if finished && !self.sync.done.load(Ordering::Acquire) {
                // Thread exited without acknowledging, so it panicked or was
                // already joined.
                return match self.join() {
                    Ok(()) => Err(Error::custom("physics thread is not running")),
                    Err(e) => Err(e),
                };
            }
            if backoff.is_completed() {
                thread::yield_now();
            } else {
                backoff.snooze();
            }
        }

        if self.sync.faulted.load(Ordering::Acquire) {
            self.sync.done.store(false, Ordering::Release);
            return match self.join() {
                Ok(()) => Err(Error::custom("physics thread faulted")),
                Err(e) => Err(e),
            };
        }
        self.sync.done.store(false, Ordering::Release);
        Ok(())
    }

    /// Raise `quit` and join. A step in flight is finished first.
    pub fn shutdown(mut self) -> Result<()> {
        self.sync.quit.store(true, Ordering::Release);
        self.join()
    }

    fn join(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        match handle.join() {
            Ok(result) => result,
            Err(_) => {
                log::error!("physics thread panicked");
                Err(Error::PhysicsThreadPanicked)
            }
        }
    }
}

impl Drop for PhysicsThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.sync.quit.store(true, Ordering::Release);
            if let Err(e) = self.join() {
                log::warn!("physics thread stopped with error: {e}");
            }
        }
    }
}

fn physics_loop<F>(sync: &FrameSync, config: &SchedulerConfig, mut step: F) -> Result<()>
where
    F: FnMut(f32) -> Result<()>,
{
    #[cfg(feature = "high_priority")]
    if config.high_priority {
        match thread_priority::set_current_thread_priority(thread_priority::ThreadPriority::Max) {
            Ok(()) => log::info!("physics thread priority raised to Max"),
            Err(e) => log::warn!("could not raise physics thread priority: {e:?}"),
        }
    }

    let backoff = Backoff::new();
    loop {
        if sync.update_requested.swap(false, Ordering::AcqRel) {
            let delta_ms = f32::from_bits(sync.delta_bits.load(Ordering::Relaxed));
            if let Err(e) = step(delta_ms) {
                log::error!("physics step failed (delta {delta_ms} ms): {e}");
                sync.faulted.store(true, Ordering::Release);
                sync.done.store(true, Ordering::Release);
                return Err(e);
            }
            sync.done.store(true, Ordering::Release);
            backoff.reset();
            if !config.post_step_sleep.is_zero() {
                thread::sleep(config.post_step_sleep);
            }
            continue;
        }

        if sync.quit.load(Ordering::Acquire) {
            log::debug!("physics thread received quit");
            return Ok(());
        }

        if backoff.is_completed() {
            thread::sleep(IDLE_SLEEP);
        } else {
            backoff.snooze();
        }
    }
}
