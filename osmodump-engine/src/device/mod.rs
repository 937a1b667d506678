//! The receiver as seen by the acquisition core: a narrow capability for
//! opening, configuring, reading, cancelling and closing one device.

mod registry;
mod replay;
mod tone;
mod transfer;
mod tuner;

pub use registry::{Backend, SimulatedRegistry};
pub use replay::ReplayDevice;
pub use tone::{ToneDevice, ToneSpec};
pub use tuner::{SUPPORTED_GAINS, SUPPORTED_SAMPLE_RATES, Tuner};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// libusb-style status codes reported by the device layer.
pub mod status {
    pub const IO: i32 = -1;
    pub const INVALID_PARAM: i32 = -2;
    pub const NOT_FOUND: i32 = -5;
    pub const BUSY: i32 = -6;
    pub const INTERRUPTED: i32 = -10;
    pub const NOT_SUPPORTED: i32 = -12;
}

/// Errors reported by a device or the registry it came from.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The index is outside the registry.
    #[error("no device with index {index} ({count} available)")]
    NoSuchDevice { index: u32, count: u32 },

    /// The device exists but could not be claimed.
    #[error("failed to open device: {0}")]
    OpenFailed(String),

    /// The device refused a parameter.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The sample FIFO could not be reset.
    #[error("failed to reset buffer: {0}")]
    ResetFailed(String),

    /// Streaming failed.
    #[error("I/O error {status}: {message}")]
    Io { status: i32, message: String },
}

impl DeviceError {
    pub fn io<S: Into<String>>(status: i32, message: S) -> Self {
        DeviceError::Io {
            status,
            message: message.into(),
        }
    }

    /// The negative status code this error reports at the process boundary.
    pub fn status(&self) -> i32 {
        match self {
            DeviceError::NoSuchDevice { .. } => status::NOT_FOUND,
            DeviceError::OpenFailed(_) => status::BUSY,
            DeviceError::Unsupported(_) => status::NOT_SUPPORTED,
            DeviceError::ResetFailed(_) => status::IO,
            DeviceError::Io { status, .. } => *status,
        }
    }
}

/// Vendor, product and serial strings from the USB descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UsbStrings {
    pub vendor: String,
    pub product: String,
    pub serial: String,
}

impl std::fmt::Display for UsbStrings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}, SN: {}", self.vendor, self.product, self.serial)
    }
}

/// Thread-safe handle that aborts in-flight and future reads on one device.
///
/// Cancellation is sticky: once cancelled, every blocking read on the device
/// returns promptly.
#[derive(Debug, Clone, Default)]
pub struct DeviceCanceller(Arc<AtomicBool>);

impl DeviceCanceller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One opened receiver. Not reentrant: configuration and reads take
/// `&mut self`, and only [`DeviceCanceller`] may be used from other threads.
pub trait Device: Send {
    /// Request a sample rate and return the rate the hardware settled on.
    fn set_sample_rate(&mut self, rate: u32) -> Result<u32, DeviceError>;

    /// The sample rate currently applied.
    fn sample_rate(&self) -> u32;

    fn set_center_frequency(&mut self, hz: u32) -> Result<(), DeviceError>;

    /// `auto = false` hands gain control to [`Device::set_gain`].
    fn set_gain_mode(&mut self, auto: bool) -> Result<(), DeviceError>;

    /// Gain in tenths of a dB. Only meaningful in manual gain mode.
    fn set_gain(&mut self, tenths_db: i32) -> Result<(), DeviceError>;

    /// Supported gains in tenths of a dB, ascending.
    fn gains(&self) -> Vec<i32>;

    /// Supported sample rates in Hz, ascending.
    fn sample_rates(&self) -> Vec<u32>;

    fn usb_strings(&self) -> Result<UsbStrings, DeviceError>;

    /// Discard stale FIFO contents. Call once before the first read.
    fn reset_buffer(&mut self) -> Result<(), DeviceError>;

    /// Blocking read of up to `buf.len()` bytes. A short count means the
    /// stream ended.
    fn read_sync(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError>;

    /// Stream transfer units of `unit_size` bytes into `callback` until the
    /// device is cancelled, the stream ends, or a transfer fails.
    ///
    /// `queue_depth` transfers are kept in flight. The callback must not block
    /// beyond its own write and must not reconfigure the device.
    fn read_async(
        &mut self,
        callback: &mut (dyn FnMut(&[u8]) + Send),
        queue_depth: u32,
        unit_size: u32,
    ) -> Result<(), DeviceError>;

    /// Handle for aborting reads from another thread or from the callback.
    fn canceller(&self) -> DeviceCanceller;

    fn cancel(&self) {
        self.canceller().cancel();
    }

    /// Release the device claim. Idempotent.
    fn close(&mut self);
}

/// The collection of devices a process can open.
pub trait DeviceRegistry {
    fn count(&self) -> u32;

    /// Human readable device name, `None` for an unknown index.
    fn name(&self, index: u32) -> Option<String>;

    fn usb_strings(&self, index: u32) -> Result<UsbStrings, DeviceError>;

    fn open(&self, index: u32) -> Result<Box<dyn Device>, DeviceError>;
}
