//! Platform collaborators consumed by the adapter
//!
//! The host Bluetooth stack is callback driven: operations hand back an
//! opaque async-operation object that reports a terminal status later, on a
//! thread of the platform's choosing. This module describes the small surface
//! the adapter needs from that stack, so the real WinRT binding, the emulated
//! runtime and the test doubles can be swapped freely.

pub mod emulated;
pub mod mock;
pub mod signature;
#[cfg(target_os = "windows")]
pub mod winrt;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::bridge::CompletionHandler;
use crate::error::{Error, Result};

/// Apartment threading mode requested when initializing the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadingModel {
    SingleThreaded,
    MultiThreaded,
}

impl ThreadingModel {
    /// Raw `RO_INIT_TYPE` value for this mode
    pub fn ro_init_type(self) -> i32 {
        match self {
            ThreadingModel::SingleThreaded => 0,
            ThreadingModel::MultiThreaded => 1,
        }
    }
}

impl Default for ThreadingModel {
    fn default() -> Self {
        ThreadingModel::MultiThreaded
    }
}

impl fmt::Display for ThreadingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadingModel::SingleThreaded => write!(f, "single-threaded"),
            ThreadingModel::MultiThreaded => write!(f, "multi-threaded"),
        }
    }
}

impl FromStr for ThreadingModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "single" | "sta" | "single_threaded" | "single-threaded" => {
                Ok(ThreadingModel::SingleThreaded)
            }
            "multi" | "mta" | "multi_threaded" | "multi-threaded" => {
                Ok(ThreadingModel::MultiThreaded)
            }
            other => Err(Error::Config(format!("Unknown threading model: {}", other))),
        }
    }
}

/// Terminal (or in-flight) status reported by a platform async operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum AsyncStatus {
    Started = 0,
    Completed = 1,
    Canceled = 2,
    Error = 3,
}

impl AsyncStatus {
    /// Numeric code as reported by the platform
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(AsyncStatus::Started),
            1 => Some(AsyncStatus::Completed),
            2 => Some(AsyncStatus::Canceled),
            3 => Some(AsyncStatus::Error),
            _ => None,
        }
    }

    /// Status delivered by a platform callback
    ///
    /// Codes outside the known set are treated as a failure and logged with
    /// the raw value.
    pub fn from_platform_code(code: i32) -> Self {
        Self::from_code(code).unwrap_or_else(|| {
            tracing::debug!(code, "unknown async status code, treating as error");
            AsyncStatus::Error
        })
    }

    /// Whether the platform contract allows this status in a completion callback
    pub fn is_terminal(self) -> bool {
        !matches!(self, AsyncStatus::Started)
    }
}

impl fmt::Display for AsyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AsyncStatus::Started => "Started",
            AsyncStatus::Completed => "Completed",
            AsyncStatus::Canceled => "Canceled",
            AsyncStatus::Error => "Error",
        };
        f.write_str(name)
    }
}

/// Per-process/per-thread activation runtime
pub trait PlatformRuntime: Send + Sync {
    /// Initialize the calling thread with the given threading mode.
    ///
    /// Repeating the call with the same mode succeeds. Asking for a different
    /// mode on a thread that is already initialized is an error.
    fn initialize(&self, model: ThreadingModel) -> Result<()>;

    /// Short name used in log output
    fn name(&self) -> &'static str;
}

/// An in-flight platform operation that accepts one completion observer
pub trait AsyncOperation: Send + Sync {
    /// Register `handler` as the completion observer.
    ///
    /// The platform invokes the handler exactly once with the terminal status,
    /// possibly synchronously from inside this call if the operation has
    /// already finished.
    fn set_completed(&self, handler: CompletionHandler) -> Result<()>;
}

impl<T: AsyncOperation + ?Sized> AsyncOperation for Arc<T> {
    fn set_completed(&self, handler: CompletionHandler) -> Result<()> {
        (**self).set_completed(handler)
    }
}

/// Advertisement watcher owned by the adapter while scanning
pub trait AdvertisementWatcher: Send + Sync {
    fn start(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
}

impl<T: AdvertisementWatcher + ?Sized> AdvertisementWatcher for Arc<T> {
    fn start(&self) -> Result<()> {
        (**self).start()
    }

    fn stop(&self) -> Result<()> {
        (**self).stop()
    }
}

/// Runtime used by the process-wide default adapter
pub fn default_runtime() -> Arc<dyn PlatformRuntime> {
    #[cfg(target_os = "windows")]
    {
        Arc::new(winrt::WinRtRuntime)
    }

    #[cfg(not(target_os = "windows"))]
    {
        Arc::new(emulated::EmulatedRuntime::new())
    }
}
