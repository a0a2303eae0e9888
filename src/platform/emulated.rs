//! In-process activation runtime for hosts without WinRT
//!
//! Tracks the threading mode each thread was initialized with, with the same
//! rules as `RoInitialize`: re-initializing with the same mode succeeds, a
//! different mode on an initialized thread fails with a changed-mode error.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::thread::{self, ThreadId};

use super::{PlatformRuntime, ThreadingModel};
use crate::error::{Error, Result};

/// `RPC_E_CHANGED_MODE`
pub const CHANGED_MODE_HRESULT: u32 = 0x8001_0106;

/// Per-thread threading modes
///
/// Entries are keyed by `ThreadId` and live until the thread calls
/// [`EmulatedRuntime::uninitialize`]. A thread that exits without doing so
/// leaves its entry behind, so hosts that churn short-lived threads should
/// uninitialize before the thread ends.
#[derive(Debug, Default)]
pub struct EmulatedRuntime {
    apartments: Mutex<HashMap<ThreadId, ThreadingModel>>,
}

impl EmulatedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Threading mode the calling thread was initialized with, if any
    pub fn current_model(&self) -> Option<ThreadingModel> {
        self.apartments.lock().get(&thread::current().id()).copied()
    }

    pub fn initialized_threads(&self) -> usize {
        self.apartments.lock().len()
    }

    /// Forget the calling thread's mode, like `RoUninitialize`
    ///
    /// Returns false if the thread was never initialized.
    pub fn uninitialize(&self) -> bool {
        let removed = self.apartments.lock().remove(&thread::current().id());
        if let Some(model) = removed {
            tracing::debug!(%model, "uninitialized emulated runtime for thread");
        }
        removed.is_some()
    }
}

impl PlatformRuntime for EmulatedRuntime {
    fn initialize(&self, model: ThreadingModel) -> Result<()> {
        let id = thread::current().id();
        let mut apartments = self.apartments.lock();

        match apartments.get(&id) {
            Some(existing) if *existing == model => {
                tracing::trace!(%model, "thread already initialized");
                Ok(())
            }
            Some(existing) => Err(Error::Initialization(format!(
                "thread already initialized as {}, cannot switch to {} (HRESULT {:#010x})",
                existing, model, CHANGED_MODE_HRESULT
            ))),
            None => {
                apartments.insert(id, model);
                tracing::debug!(%model, "initialized emulated runtime for thread");
                Ok(())
            }
        }
    }

    fn name(&self) -> &'static str {
        "emulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_same_mode_is_idempotent() {
        let runtime = EmulatedRuntime::new();
        runtime.initialize(ThreadingModel::MultiThreaded).unwrap();
        runtime.initialize(ThreadingModel::MultiThreaded).unwrap();
        assert_eq!(runtime.current_model(), Some(ThreadingModel::MultiThreaded));
        assert_eq!(runtime.initialized_threads(), 1);
    }

    #[test]
    fn test_changed_mode_is_reported() {
        let runtime = EmulatedRuntime::new();
        runtime.initialize(ThreadingModel::MultiThreaded).unwrap();
        let err = runtime
            .initialize(ThreadingModel::SingleThreaded)
            .unwrap_err();
        assert!(matches!(err, Error::Initialization(_)));
        assert!(err.to_string().contains("0x80010106"));
    }

    #[test]
    fn test_threads_are_independent() {
        let runtime = Arc::new(EmulatedRuntime::new());
        runtime.initialize(ThreadingModel::MultiThreaded).unwrap();

        let other = Arc::clone(&runtime);
        thread::spawn(move || other.initialize(ThreadingModel::SingleThreaded))
            .join()
            .unwrap()
            .unwrap();

        assert_eq!(runtime.initialized_threads(), 2);
        assert_eq!(runtime.current_model(), Some(ThreadingModel::MultiThreaded));
    }

    #[test]
    fn test_uninitialize_releases_thread_entry() {
        let runtime = Arc::new(EmulatedRuntime::new());

        for _ in 0..8 {
            let worker = Arc::clone(&runtime);
            thread::spawn(move || {
                worker.initialize(ThreadingModel::SingleThreaded).unwrap();
                assert!(worker.uninitialize());
                assert!(!worker.uninitialize());
            })
            .join()
            .unwrap();
        }
        assert_eq!(runtime.initialized_threads(), 0);

        runtime.initialize(ThreadingModel::MultiThreaded).unwrap();
        assert!(runtime.uninitialize());
        runtime.initialize(ThreadingModel::SingleThreaded).unwrap();
        assert_eq!(runtime.current_model(), Some(ThreadingModel::SingleThreaded));
    }
}
