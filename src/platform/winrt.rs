//! WinRT binding for the platform traits

use windows::core::{ComInterface, RuntimeType, GUID};
use windows::Foundation::{AsyncOperationCompletedHandler, IAsyncOperation};
use windows::Win32::System::WinRT::{RoInitialize, RO_INIT_MULTITHREADED, RO_INIT_SINGLETHREADED};

use super::{AsyncOperation, AsyncStatus, PlatformRuntime, ThreadingModel};
use crate::bridge::CompletionHandler;
use crate::error::{Error, Result};

/// Process activation runtime backed by `RoInitialize`
#[derive(Debug, Clone, Copy, Default)]
pub struct WinRtRuntime;

impl PlatformRuntime for WinRtRuntime {
    fn initialize(&self, model: ThreadingModel) -> Result<()> {
        let init_type = match model {
            ThreadingModel::SingleThreaded => RO_INIT_SINGLETHREADED,
            ThreadingModel::MultiThreaded => RO_INIT_MULTITHREADED,
        };

        // SAFETY: RoInitialize has no pointer arguments; a changed-mode
        // HRESULT comes back as an error instead of touching the apartment.
        unsafe { RoInitialize(init_type) }.map_err(|e| {
            Error::Initialization(format!("RoInitialize({}) failed: {}", model, e))
        })?;

        tracing::debug!(%model, "initialized WinRT runtime for thread");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "winrt"
    }
}

impl<T: RuntimeType + 'static> AsyncOperation for IAsyncOperation<T> {
    fn set_completed(&self, handler: CompletionHandler) -> Result<()> {
        let expected = <AsyncOperationCompletedHandler<T> as ComInterface>::IID;
        if expected != GUID::from_u128(handler.iid().as_u128()) {
            return Err(Error::Registration(format!(
                "handler identity {} does not match {:?}",
                handler.iid(),
                expected
            )));
        }

        let delegate = AsyncOperationCompletedHandler::<T>::new(move |_, status| {
            handler.invoke(AsyncStatus::from_platform_code(status.0));
            Ok(())
        });

        self.SetCompleted(&delegate)
            .map_err(|e| Error::Registration(e.to_string()))
    }
}
