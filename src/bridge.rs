//! Blocking bridge over callback-driven platform async operations
//!
//! The platform reports completion by invoking a handler on a thread it owns.
//! Callers in this crate want a plain `Result`. [`await_async_operation`]
//! resolves the handler identity for the operation's result type, arms a
//! one-shot [`CompletionSignal`], registers the handler and blocks until the
//! platform reports a terminal status.
//!
//! Each wait moves through `Pending -> Armed -> Signaled -> Returned`. The
//! handler is released when the wait is dropped, so a late or repeated
//! completion after the caller has returned is discarded.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::platform::signature::{completed_handler_iid, Guid, TypeSignature};
use crate::platform::{AsyncOperation, AsyncStatus};

/// Single-use, single-producer/single-consumer completion slot
#[derive(Debug, Default)]
pub struct CompletionSignal {
    slot: Mutex<Option<AsyncStatus>>,
    cond: Condvar,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `status` and wake the waiter. Only the first call has any effect.
    pub fn signal(&self, status: AsyncStatus) -> bool {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(status);
        self.cond.notify_all();
        true
    }

    pub fn is_signaled(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Block until signaled
    pub fn wait(&self) -> AsyncStatus {
        let mut slot = self.slot.lock();
        loop {
            if let Some(status) = *slot {
                return status;
            }
            self.cond.wait(&mut slot);
        }
    }

    /// Block until signaled or `timeout` passes.
    ///
    /// A timeout too large to express as a deadline waits indefinitely.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<AsyncStatus> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Some(self.wait());
        };
        let mut slot = self.slot.lock();
        loop {
            if let Some(status) = *slot {
                return Some(status);
            }
            if self.cond.wait_until(&mut slot, deadline).timed_out() {
                return *slot;
            }
        }
    }
}

struct HandlerInner {
    iid: Guid,
    signal: Mutex<Option<Arc<CompletionSignal>>>,
    released: AtomicBool,
    invocations: AtomicUsize,
}

/// Completion callback object handed to the platform.
///
/// Clones share one underlying callback; the platform keeps its clone until it
/// fires, the bridge keeps another to release on exit.
#[derive(Clone)]
pub struct CompletionHandler {
    inner: Arc<HandlerInner>,
}

impl CompletionHandler {
    pub fn new(iid: Guid, signal: Arc<CompletionSignal>) -> Self {
        Self {
            inner: Arc::new(HandlerInner {
                iid,
                signal: Mutex::new(Some(signal)),
                released: AtomicBool::new(false),
                invocations: AtomicUsize::new(0),
            }),
        }
    }

    /// Interface identity this handler was built for
    pub fn iid(&self) -> Guid {
        self.inner.iid
    }

    /// Entry point for the platform. Returns whether this call completed the wait.
    pub fn invoke(&self, status: AsyncStatus) -> bool {
        self.inner.invocations.fetch_add(1, Ordering::SeqCst);

        let signal = self.inner.signal.lock().clone();
        let Some(signal) = signal else {
            tracing::debug!(iid = %self.inner.iid, %status, "completion after release discarded");
            return false;
        };

        let first = signal.signal(status);
        if !first {
            tracing::debug!(iid = %self.inner.iid, %status, "repeated completion ignored");
        }
        first
    }

    /// Detach the handler from its signal. Only the first call releases.
    pub fn release(&self) -> bool {
        if self.inner.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.signal.lock().take();
        true
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Number of times the platform invoked this handler
    pub fn invocations(&self) -> usize {
        self.inner.invocations.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for CompletionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionHandler")
            .field("iid", &self.inner.iid)
            .field("released", &self.is_released())
            .field("invocations", &self.invocations())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitState {
    Pending,
    Armed,
    Signaled,
    Returned,
}

/// One awaited operation; releases its handler when dropped
struct OperationWait {
    state: WaitState,
    signal: Arc<CompletionSignal>,
    handler: CompletionHandler,
}

impl OperationWait {
    fn new(iid: Guid) -> Self {
        let signal = Arc::new(CompletionSignal::new());
        let handler = CompletionHandler::new(iid, Arc::clone(&signal));
        Self {
            state: WaitState::Pending,
            signal,
            handler,
        }
    }

    fn transition(&mut self, next: WaitState) {
        tracing::trace!(iid = %self.handler.iid(), from = ?self.state, to = ?next, "async wait transition");
        self.state = next;
    }

    /// Register the handler. Last setup step before blocking.
    fn arm<O: AsyncOperation + ?Sized>(&mut self, operation: &O) -> Result<()> {
        debug_assert_eq!(self.state, WaitState::Pending);
        operation.set_completed(self.handler.clone())?;
        self.transition(WaitState::Armed);
        Ok(())
    }

    fn block(&mut self, timeout: Option<Duration>) -> Result<AsyncStatus> {
        debug_assert_eq!(self.state, WaitState::Armed);
        let status = match timeout {
            None => self.signal.wait(),
            Some(limit) => self.signal.wait_timeout(limit).ok_or(Error::Timeout(limit))?,
        };
        self.transition(WaitState::Signaled);
        Ok(status)
    }

    fn finish(&mut self, status: AsyncStatus) -> Result<()> {
        debug_assert_eq!(self.state, WaitState::Signaled);
        self.transition(WaitState::Returned);
        match status {
            AsyncStatus::Completed => Ok(()),
            status => Err(Error::AsyncOperationFailed { status }),
        }
    }
}

impl Drop for OperationWait {
    fn drop(&mut self) {
        self.handler.release();
    }
}

/// Block until `operation` reports a terminal status.
///
/// `signature` is the operation's result type; it selects the handler
/// identity. Waits indefinitely.
pub fn await_async_operation<O>(operation: &O, signature: &TypeSignature) -> Result<()>
where
    O: AsyncOperation + ?Sized,
{
    await_async_operation_timeout(operation, signature, None)
}

/// Like [`await_async_operation`], giving up with [`Error::Timeout`] after
/// `timeout` when one is set.
pub fn await_async_operation_timeout<O>(
    operation: &O,
    signature: &TypeSignature,
    timeout: Option<Duration>,
) -> Result<()>
where
    O: AsyncOperation + ?Sized,
{
    let iid = completed_handler_iid(signature)?;
    let mut wait = OperationWait::new(iid);
    wait.arm(operation)?;
    let status = wait.block(timeout)?;
    wait.finish(status)
}

/// Run the blocking wait on tokio's blocking pool
pub async fn await_async_operation_async<O>(
    operation: Arc<O>,
    signature: TypeSignature,
    timeout: Option<Duration>,
) -> Result<()>
where
    O: AsyncOperation + ?Sized + 'static,
{
    tokio::task::spawn_blocking(move || {
        await_async_operation_timeout(operation.as_ref(), &signature, timeout)
    })
    .await?
}

/// Bridge configured with the adapter's completion timeout
#[derive(Debug, Clone, Copy, Default)]
pub struct AsyncBridge {
    timeout: Option<Duration>,
}

impl AsyncBridge {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn wait<O>(&self, operation: &O, signature: &TypeSignature) -> Result<()>
    where
        O: AsyncOperation + ?Sized,
    {
        await_async_operation_timeout(operation, signature, self.timeout)
    }

    pub async fn wait_async<O>(&self, operation: Arc<O>, signature: TypeSignature) -> Result<()>
    where
        O: AsyncOperation + ?Sized + 'static,
    {
        await_async_operation_async(operation, signature, self.timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockAsyncOperation;
    use crate::platform::signature::ASYNC_OPERATION_COMPLETED_HANDLER;
    use std::thread;

    #[test]
    fn test_signal_fires_once() {
        let signal = CompletionSignal::new();
        assert!(!signal.is_signaled());
        assert!(signal.signal(AsyncStatus::Completed));
        assert!(!signal.signal(AsyncStatus::Error));
        assert_eq!(signal.wait(), AsyncStatus::Completed);
    }

    #[test]
    fn test_signal_wait_timeout() {
        let signal = CompletionSignal::new();
        assert_eq!(signal.wait_timeout(Duration::from_millis(20)), None);
        signal.signal(AsyncStatus::Canceled);
        assert_eq!(
            signal.wait_timeout(Duration::from_millis(20)),
            Some(AsyncStatus::Canceled)
        );
    }

    #[test]
    fn test_signal_wait_unbounded_timeout() {
        let signal = Arc::new(CompletionSignal::new());
        let producer = Arc::clone(&signal);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            producer.signal(AsyncStatus::Completed)
        });
        assert_eq!(
            signal.wait_timeout(Duration::from_secs(u64::MAX)),
            Some(AsyncStatus::Completed)
        );
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_signal_across_threads() {
        let signal = Arc::new(CompletionSignal::new());
        let producer = Arc::clone(&signal);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            producer.signal(AsyncStatus::Completed)
        });
        assert_eq!(signal.wait(), AsyncStatus::Completed);
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_handler_release_is_idempotent() {
        let signal = Arc::new(CompletionSignal::new());
        let handler = CompletionHandler::new(ASYNC_OPERATION_COMPLETED_HANDLER, Arc::clone(&signal));
        let platform_copy = handler.clone();

        assert!(handler.release());
        assert!(!handler.release());
        assert!(platform_copy.is_released());

        assert!(!platform_copy.invoke(AsyncStatus::Completed));
        assert!(!signal.is_signaled());
        assert_eq!(platform_copy.invocations(), 1);
    }

    #[test]
    fn test_wait_state_sequence() {
        let operation = MockAsyncOperation::completing(AsyncStatus::Completed);
        let mut wait = OperationWait::new(ASYNC_OPERATION_COMPLETED_HANDLER);
        assert_eq!(wait.state, WaitState::Pending);

        wait.arm(&operation).unwrap();
        assert_eq!(wait.state, WaitState::Armed);

        let status = wait.block(None).unwrap();
        assert_eq!(wait.state, WaitState::Signaled);

        wait.finish(status).unwrap();
        assert_eq!(wait.state, WaitState::Returned);

        let handler = wait.handler.clone();
        assert!(!handler.is_released());
        drop(wait);
        assert!(handler.is_released());
    }

    #[test]
    fn test_failed_registration_releases_handler() {
        let operation = MockAsyncOperation::completing(AsyncStatus::Completed).rejecting("busy");
        let mut wait = OperationWait::new(ASYNC_OPERATION_COMPLETED_HANDLER);
        let handler = wait.handler.clone();

        assert!(matches!(wait.arm(&operation), Err(Error::Registration(_))));
        assert_eq!(wait.state, WaitState::Pending);
        drop(wait);
        assert!(handler.is_released());
    }

    #[test]
    fn test_bridge_applies_timeout() {
        let bridge = AsyncBridge::new(Some(Duration::from_millis(30)));
        let operation = MockAsyncOperation::manual();
        let err = bridge.wait(&operation, &TypeSignature::Boolean).unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));

        let handler = operation.handler().unwrap();
        assert!(handler.is_released());
        assert!(!operation.fire(AsyncStatus::Completed));
    }
}
