//! Bluetooth LE adapter handle
//!
//! An [`Adapter`] owns the long-lived session state for the local radio: the
//! active advertisement watcher, the user's connection callback and the
//! default advertisement. Operations that need a platform async result go
//! through the adapter's [`AsyncBridge`].

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use uuid::Uuid;

use crate::bridge::AsyncBridge;
use crate::config::AdapterConfig;
use crate::error::{Error, Result};
use crate::platform::signature::TypeSignature;
use crate::platform::{default_runtime, AdvertisementWatcher, AsyncOperation, PlatformRuntime};

/// Legacy advertising payload leaves room for at most this many name bytes
pub const MAX_LOCAL_NAME_LEN: usize = 29;
const MIN_ADVERTISING_INTERVAL: Duration = Duration::from_millis(20);
const MAX_ADVERTISING_INTERVAL: Duration = Duration::from_millis(10_240);

/// 48-bit Bluetooth device address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddress(pub [u8; 6]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

impl FromStr for MacAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts
                .next()
                .filter(|p| p.len() == 2)
                .ok_or_else(|| Error::Config(format!("Invalid MAC address: {}", s)))?;
            *byte = u8::from_str_radix(part, 16)
                .map_err(|_| Error::Config(format!("Invalid MAC address: {}", s)))?;
        }
        if parts.next().is_some() {
            return Err(Error::Config(format!("Invalid MAC address: {}", s)));
        }
        Ok(MacAddress(bytes))
    }
}

/// Remote device as reported to the connection handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub address: MacAddress,
    pub name: Option<String>,
}

impl Device {
    pub fn new(address: MacAddress) -> Self {
        Self {
            address,
            name: None,
        }
    }
}

/// Advertisement configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Advertisement {
    /// Local device name
    pub local_name: String,
    /// Service UUIDs to advertise
    pub service_uuids: Vec<Uuid>,
    /// Advertising interval (20ms - 10.24s range)
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Whether to make device connectable
    pub connectable: bool,
}

impl Default for Advertisement {
    fn default() -> Self {
        Self {
            local_name: "ble-host".to_string(),
            service_uuids: Vec::new(),
            interval: Duration::from_millis(100),
            connectable: true,
        }
    }
}

impl Advertisement {
    pub fn validate(&self) -> Result<()> {
        if self.local_name.len() > MAX_LOCAL_NAME_LEN {
            return Err(Error::Config(format!(
                "Local name must be <= {} bytes",
                MAX_LOCAL_NAME_LEN
            )));
        }
        if self.interval < MIN_ADVERTISING_INTERVAL || self.interval > MAX_ADVERTISING_INTERVAL {
            return Err(Error::Config(format!(
                "Advertising interval {:?} outside 20ms..=10.24s",
                self.interval
            )));
        }
        Ok(())
    }
}

/// Callback receiving connect/disconnect events
pub type ConnectHandler = Arc<dyn Fn(&Device, bool) + Send + Sync>;

fn noop_connect_handler() -> ConnectHandler {
    Arc::new(|_: &Device, _: bool| {})
}

/// Handle for the local Bluetooth radio
pub struct Adapter {
    runtime: Arc<dyn PlatformRuntime>,
    config: AdapterConfig,
    bridge: AsyncBridge,
    enabled: AtomicBool,
    watcher: Mutex<Option<Box<dyn AdvertisementWatcher>>>,
    connect_handler: RwLock<ConnectHandler>,
    default_advertisement: Mutex<Option<Advertisement>>,
    /// Load failure kept for `enable` to report
    config_error: Option<String>,
}

impl Adapter {
    /// Create a disabled adapter with a no-op connection handler
    pub fn new(runtime: Arc<dyn PlatformRuntime>, config: AdapterConfig) -> Self {
        let bridge = AsyncBridge::new(config.completion_timeout);
        Self {
            runtime,
            config,
            bridge,
            enabled: AtomicBool::new(false),
            watcher: Mutex::new(None),
            connect_handler: RwLock::new(noop_connect_handler()),
            default_advertisement: Mutex::new(None),
            config_error: None,
        }
    }

    /// Create an adapter from the outcome of loading its configuration.
    ///
    /// A load failure leaves the adapter on default settings and makes every
    /// `enable` call return it as [`Error::Config`].
    pub fn from_loaded(runtime: Arc<dyn PlatformRuntime>, loaded: Result<AdapterConfig>) -> Self {
        match loaded {
            Ok(config) => Self::new(runtime, config),
            Err(e) => {
                let mut adapter = Self::new(runtime, AdapterConfig::default());
                adapter.config_error = Some(e.to_string());
                adapter
            }
        }
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Initialize the platform runtime for the calling thread.
    ///
    /// Must be called before any other Bluetooth operation, once per thread
    /// that uses the adapter. Calling it again with the same threading mode
    /// is harmless; a runtime already initialized with a different mode on
    /// this thread is reported as [`Error::Initialization`]. An adapter whose
    /// configuration failed to load reports that failure as [`Error::Config`].
    pub fn enable(&self) -> Result<()> {
        if let Some(reason) = &self.config_error {
            return Err(Error::Config(reason.clone()));
        }
        self.runtime.initialize(self.config.threading_model)?;

        if !self.enabled.swap(true, Ordering::AcqRel) {
            tracing::info!(
                runtime = self.runtime.name(),
                model = %self.config.threading_model,
                "adapter enabled"
            );
        }
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Hardware address of the local radio.
    ///
    /// Not available on this platform yet; always [`Error::NotImplemented`].
    pub fn address(&self) -> Result<MacAddress> {
        Err(Error::NotImplemented(
            "local adapter address retrieval".to_string(),
        ))
    }

    /// Replace the connection handler
    pub fn set_connect_handler<F>(&self, handler: F)
    where
        F: Fn(&Device, bool) + Send + Sync + 'static,
    {
        *self.connect_handler.write() = Arc::new(handler);
    }

    /// Route a platform connection event to the user's handler
    pub fn notify_connection(&self, device: &Device, connected: bool) {
        // Called outside the lock so the handler may replace itself.
        let handler = Arc::clone(&*self.connect_handler.read());
        tracing::debug!(address = %device.address, connected, "connection event");
        handler(device, connected);
    }

    /// Install and start an advertisement watcher, stopping any previous one
    pub fn start_watcher(&self, watcher: Box<dyn AdvertisementWatcher>) -> Result<()> {
        if !self.is_enabled() {
            return Err(Error::NotEnabled);
        }

        let mut slot = self.watcher.lock();
        // A previous watcher that fails to stop stays installed.
        if let Some(previous) = slot.as_ref() {
            previous.stop()?;
        }
        *slot = None;
        watcher.start()?;
        *slot = Some(watcher);
        Ok(())
    }

    /// Stop and drop the active watcher. Returns whether one was running.
    ///
    /// If the watcher fails to stop it stays installed.
    pub fn stop_watcher(&self) -> Result<bool> {
        let mut slot = self.watcher.lock();
        match slot.as_ref() {
            Some(watcher) => {
                watcher.stop()?;
                *slot = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn has_watcher(&self) -> bool {
        self.watcher.lock().is_some()
    }

    /// Advertisement used when the caller does not supply one
    pub fn default_advertisement(&self) -> Advertisement {
        self.default_advertisement
            .lock()
            .get_or_insert_with(|| self.config.advertisement.clone())
            .clone()
    }

    pub fn set_default_advertisement(&self, advertisement: Advertisement) -> Result<()> {
        advertisement.validate()?;
        *self.default_advertisement.lock() = Some(advertisement);
        Ok(())
    }

    /// Block on a platform async operation using the configured timeout
    pub fn await_operation<O>(&self, operation: &O, signature: &TypeSignature) -> Result<()>
    where
        O: AsyncOperation + ?Sized,
    {
        if !self.is_enabled() {
            return Err(Error::NotEnabled);
        }
        self.bridge.wait(operation, signature)
    }

    pub async fn await_operation_async<O>(
        &self,
        operation: Arc<O>,
        signature: TypeSignature,
    ) -> Result<()>
    where
        O: AsyncOperation + ?Sized + 'static,
    {
        if !self.is_enabled() {
            return Err(Error::NotEnabled);
        }
        self.bridge.wait_async(operation, signature).await
    }
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("runtime", &self.runtime.name())
            .field("enabled", &self.is_enabled())
            .field("has_watcher", &self.has_watcher())
            .field("config", &self.config)
            .field("config_error", &self.config_error)
            .finish()
    }
}

/// The process-wide default adapter.
///
/// Built on first use from [`AdapterConfig::load`] and the platform's default
/// runtime. Call [`Adapter::enable`] before use; it returns any configuration
/// load error.
pub fn default_adapter() -> &'static Adapter {
    static DEFAULT_ADAPTER: OnceLock<Adapter> = OnceLock::new();
    DEFAULT_ADAPTER.get_or_init(|| Adapter::from_loaded(default_runtime(), AdapterConfig::load()))
}
