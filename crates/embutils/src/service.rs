//! Background worker loop with pause, resume and stop control.
//!
//! A [`Service`] runs a [`ServiceTask`] on its own named thread. The task's
//! `task` method is called repeatedly with a fixed delay in between, and the
//! hooks run on the worker thread around state changes.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Default delay between task iterations.
pub const DEFAULT_TASK_DELAY: Duration = Duration::from_millis(1);

/// Lifecycle state of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// The task loop is executing.
    Running,
    /// The task loop is parked until resumed.
    Paused,
    /// The service ended or was asked to end.
    Stopped,
}

#[derive(Debug)]
struct Control {
    requested: ServiceState,
    acked: ServiceState,
    ended: bool,
}

#[derive(Debug)]
struct Shared {
    name: String,
    control: Mutex<Control>,
    signal: Condvar,
}

/// Cloneable control handle for a running service.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    shared: Arc<Shared>,
}

impl ServiceHandle {
    fn new(name: String) -> Self {
        Self {
            shared: Arc::new(Shared {
                name,
                control: Mutex::new(Control {
                    requested: ServiceState::Running,
                    acked: ServiceState::Running,
                    ended: false,
                }),
                signal: Condvar::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Control> {
        self.shared
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Control>) -> MutexGuard<'a, Control> {
        self.shared
            .signal
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Name of the worker thread.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Requested state.
    #[must_use]
    pub fn state(&self) -> ServiceState {
        let control = self.lock();
        if control.ended {
            ServiceState::Stopped
        } else {
            control.requested
        }
    }

    /// True while running and not paused.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == ServiceState::Running
    }

    /// True until a stop has been requested or the worker ended.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.state() != ServiceState::Stopped
    }

    /// Pause the task loop.
    ///
    /// Blocks until the current iteration finished and the pause hook ran on
    /// the worker. Must not be called from the worker thread itself.
    pub fn pause(&self) {
        let mut control = self.lock();
        if control.ended || control.requested != ServiceState::Running {
            return;
        }
        control.requested = ServiceState::Paused;
        self.shared.signal.notify_all();
        while !control.ended
            && control.requested == ServiceState::Paused
            && control.acked != ServiceState::Paused
        {
            control = self.wait(control);
        }
        drop(control);
        info!(service = %self.name(), "Service paused");
    }

    /// Resume a paused task loop.
    pub fn resume(&self) {
        let mut control = self.lock();
        if control.ended || control.requested != ServiceState::Paused {
            return;
        }
        control.requested = ServiceState::Running;
        self.shared.signal.notify_all();
        drop(control);
        info!(service = %self.name(), "Service resumed");
    }

    /// Ask the worker to end. Does not wait; see [`Service::join`].
    pub fn stop(&self) {
        let mut control = self.lock();
        if control.ended || control.requested == ServiceState::Stopped {
            return;
        }
        control.requested = ServiceState::Stopped;
        self.shared.signal.notify_all();
    }

    fn ack(&self, state: ServiceState) {
        self.lock().acked = state;
        self.shared.signal.notify_all();
    }

    fn mark_ended(&self) {
        let mut control = self.lock();
        control.ended = true;
        control.acked = ServiceState::Stopped;
        self.shared.signal.notify_all();
    }
}

/// Work executed by a [`Service`].
///
/// All methods run on the worker thread.
pub trait ServiceTask: Send + 'static {
    /// Name given to the worker thread.
    fn name(&self) -> &str;

    /// Called once before the first iteration.
    fn on_start(&mut self, _handle: &ServiceHandle) {}

    /// One iteration of the task loop.
    fn task(&mut self, handle: &ServiceHandle);

    /// Called when the loop parks for a pause.
    fn on_pause(&mut self) {}

    /// Called when the loop leaves a pause.
    fn on_resume(&mut self, _handle: &ServiceHandle) {}

    /// Called once after the loop ended.
    fn on_end(&mut self) {}
}

/// Marks the service as ended even when the task panics.
struct EndGuard(ServiceHandle);

impl Drop for EndGuard {
    fn drop(&mut self) {
        self.0.mark_ended();
    }
}

fn run<T: ServiceTask>(mut task: T, handle: &ServiceHandle, delay: Duration) {
    let _guard = EndGuard(handle.clone());
    info!(service = %handle.name(), "Service started");
    task.on_start(handle);

    loop {
        let mut control = handle.lock();
        if control.requested == ServiceState::Paused {
            drop(control);
            task.on_pause();
            handle.ack(ServiceState::Paused);

            control = handle.lock();
            while control.requested == ServiceState::Paused {
                control = handle.wait(control);
            }
            if control.requested == ServiceState::Running {
                control.acked = ServiceState::Running;
                drop(control);
                task.on_resume(handle);
                continue;
            }
        }
        if control.requested == ServiceState::Stopped {
            break;
        }
        drop(control);

        task.task(handle);
        thread::sleep(delay);
    }

    task.on_end();
    info!(service = %handle.name(), "Service ended");
}

/// A task loop running on its own thread.
///
/// Dropping a service requests a stop. Outside an async runtime the drop
/// also waits for the worker to end; inside one the worker is detached and
/// finishes its current iteration on its own. Call [`Service::join`] to wait
/// explicitly.
#[derive(Debug)]
pub struct Service {
    handle: ServiceHandle,
    thread: Option<JoinHandle<()>>,
}

impl Service {
    /// Start `task` on a new thread, sleeping `delay` between iterations.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread can't be spawned.
    pub fn spawn<T: ServiceTask>(task: T, delay: Duration) -> Result<Self> {
        let handle = ServiceHandle::new(task.name().to_string());
        let worker = handle.clone();
        debug!(service = %handle.name(), delay_ms = delay.as_millis(), "Spawning service");
        let thread = thread::Builder::new()
            .name(handle.name().to_string())
            .spawn(move || run(task, &worker, delay))?;
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    /// A control handle for the service.
    #[must_use]
    pub fn handle(&self) -> ServiceHandle {
        self.handle.clone()
    }

    /// See [`ServiceHandle::state`].
    #[must_use]
    pub fn state(&self) -> ServiceState {
        self.handle.state()
    }

    /// See [`ServiceHandle::is_running`].
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    /// See [`ServiceHandle::is_alive`].
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.handle.is_alive()
    }

    /// See [`ServiceHandle::pause`].
    pub fn pause(&self) {
        self.handle.pause();
    }

    /// See [`ServiceHandle::resume`].
    pub fn resume(&self) {
        self.handle.resume();
    }

    /// See [`ServiceHandle::stop`].
    pub fn stop(&self) {
        self.handle.stop();
    }

    /// Wait for the worker thread to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the task panicked.
    pub fn join(&mut self) -> Result<()> {
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| Error::internal(format!("service '{}' panicked", self.handle.name())))?;
        }
        Ok(())
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        self.stop();
        if tokio::runtime::Handle::try_current().is_ok() {
            if self.thread.take().is_some() {
                debug!(service = %self.handle.name(), "Detached service worker");
            }
            return;
        }
        let _ = self.join();
    }
}
