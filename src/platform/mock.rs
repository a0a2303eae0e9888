//! Scripted platform doubles
//!
//! `MockAsyncOperation` plays the platform side of an async operation: it
//! accepts one completion observer and reports a status according to its
//! script, either synchronously from `set_completed`, from a background
//! thread, or when the test calls [`MockAsyncOperation::fire`].

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use super::signature::Guid;
use super::{AdvertisementWatcher, AsyncOperation, AsyncStatus};
use crate::bridge::CompletionHandler;
use crate::error::{Error, Result};

/// When and how a mock operation reports completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Invoke the handler from inside `set_completed`
    Immediate(AsyncStatus),
    /// Invoke the handler from a platform thread after a delay
    Delayed(AsyncStatus, Duration),
    /// Invoke the handler twice from a platform thread
    Twice(AsyncStatus, AsyncStatus),
    /// Only report completion when the test calls `fire`
    Manual,
}

pub struct MockAsyncOperation {
    script: Script,
    expected_iid: Option<Guid>,
    reject: Option<String>,
    handler: Mutex<Option<CompletionHandler>>,
    registered: Condvar,
    registrations: AtomicUsize,
}

impl MockAsyncOperation {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            expected_iid: None,
            reject: None,
            handler: Mutex::new(None),
            registered: Condvar::new(),
            registrations: AtomicUsize::new(0),
        }
    }

    pub fn completing(status: AsyncStatus) -> Self {
        Self::new(Script::Immediate(status))
    }

    pub fn completing_after(status: AsyncStatus, delay: Duration) -> Self {
        Self::new(Script::Delayed(status, delay))
    }

    pub fn completing_twice(first: AsyncStatus, second: AsyncStatus) -> Self {
        Self::new(Script::Twice(first, second))
    }

    pub fn manual() -> Self {
        Self::new(Script::Manual)
    }

    /// Refuse handlers whose identity is not `iid`
    pub fn expecting_iid(mut self, iid: Guid) -> Self {
        self.expected_iid = Some(iid);
        self
    }

    /// Refuse every handler with `reason`
    pub fn rejecting(mut self, reason: &str) -> Self {
        self.reject = Some(reason.to_string());
        self
    }

    /// Report `status` to the registered handler
    pub fn fire(&self, status: AsyncStatus) -> bool {
        let handler = self.handler.lock().clone();
        match handler {
            Some(handler) => handler.invoke(status),
            None => false,
        }
    }

    /// Block until a handler is registered or `timeout` passes
    pub fn wait_registered(&self, timeout: Duration) -> bool {
        let mut slot = self.handler.lock();
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            while slot.is_none() {
                self.registered.wait(&mut slot);
            }
            return true;
        };
        while slot.is_none() {
            if self.registered.wait_until(&mut slot, deadline).timed_out() {
                return slot.is_some();
            }
        }
        true
    }

    pub fn handler(&self) -> Option<CompletionHandler> {
        self.handler.lock().clone()
    }

    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }
}

impl AsyncOperation for MockAsyncOperation {
    fn set_completed(&self, handler: CompletionHandler) -> Result<()> {
        if let Some(reason) = &self.reject {
            return Err(Error::Registration(reason.clone()));
        }
        if let Some(expected) = self.expected_iid {
            if handler.iid() != expected {
                return Err(Error::Registration(format!(
                    "handler identity {} does not match {}",
                    handler.iid(),
                    expected
                )));
            }
        }

        {
            let mut slot = self.handler.lock();
            if slot.is_some() {
                return Err(Error::Registration(
                    "completion handler already assigned".to_string(),
                ));
            }
            *slot = Some(handler.clone());
            self.registrations.fetch_add(1, Ordering::SeqCst);
            self.registered.notify_all();
        }

        match self.script {
            Script::Immediate(status) => {
                handler.invoke(status);
            }
            Script::Delayed(status, delay) => {
                thread::spawn(move || {
                    thread::sleep(delay);
                    handler.invoke(status);
                });
            }
            Script::Twice(first, second) => {
                thread::spawn(move || {
                    handler.invoke(first);
                    handler.invoke(second);
                });
            }
            Script::Manual => {}
        }
        Ok(())
    }
}

/// Watcher double counting start/stop calls
#[derive(Debug, Default)]
pub struct MockWatcher {
    started: AtomicBool,
    refuse_stop: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl MockWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `stop` fail and leave the watcher running
    pub fn set_refuse_stop(&self, refuse: bool) {
        self.refuse_stop.store(refuse, Ordering::SeqCst);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl AdvertisementWatcher for MockWatcher {
    fn start(&self) -> Result<()> {
        self.started.store(true, Ordering::SeqCst);
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        if self.refuse_stop.load(Ordering::SeqCst) {
            return Err(Error::Watcher("watcher refused to stop".to_string()));
        }
        self.started.store(false, Ordering::SeqCst);
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
