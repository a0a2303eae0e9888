//! ble-host - Bluetooth LE host adapter
//!
//! The platform Bluetooth stack exposes its operations as async-operation
//! objects that report completion through a callback on a thread of its own.
//! This crate presents them as ordinary blocking calls:
//! - adapter: the local radio handle (enable, connection events, watcher)
//! - bridge: waits on one platform async operation and maps its status
//! - platform: runtime/operation traits, WinRT type signatures, doubles
//! - config / logging: TOML + env configuration, tracing setup

pub mod adapter;
pub mod bridge;
pub mod config;
pub mod error;
pub mod logging;
pub mod platform;

pub use adapter::{default_adapter, Adapter, Advertisement, ConnectHandler, Device, MacAddress};
pub use bridge::{
    await_async_operation, await_async_operation_async, await_async_operation_timeout,
    AsyncBridge, CompletionHandler, CompletionSignal,
};
pub use config::AdapterConfig;
pub use error::{Error, Result};
pub use logging::{init_logging, LoggingConfig};
pub use platform::signature::{completed_handler_iid, parameterized_instance_guid, Guid, TypeSignature};
pub use platform::{AdvertisementWatcher, AsyncOperation, AsyncStatus, PlatformRuntime, ThreadingModel};
