use super::replay::ReplayDevice;
use super::tone::{ToneDevice, ToneSpec};
use super::{Device, DeviceError, DeviceRegistry, UsbStrings};
use log::debug;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// What sits behind one registry index.
#[derive(Debug, Clone, PartialEq)]
pub enum Backend {
    /// Synthesized test tone.
    Tone(ToneSpec),
    /// Raw sample bytes replayed from a capture file.
    Replay(PathBuf),
}

type ClaimTable = Arc<Mutex<Vec<bool>>>;

fn lock(table: &ClaimTable) -> MutexGuard<'_, Vec<bool>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exclusive claim on one registry slot, released on drop.
#[derive(Debug)]
pub struct Claim {
    table: ClaimTable,
    index: usize,
}

impl Drop for Claim {
    fn drop(&mut self) {
        if let Some(slot) = lock(&self.table).get_mut(self.index) {
            *slot = false;
        }
        debug!("released claim on device {}", self.index);
    }
}

/// Registry of simulated receivers. Each index can be opened by at most one
/// handle at a time.
#[derive(Debug, Clone)]
pub struct SimulatedRegistry {
    backends: Vec<Backend>,
    claims: ClaimTable,
}

impl Default for SimulatedRegistry {
    fn default() -> Self {
        Self::new(vec![Backend::Tone(ToneSpec::default())])
    }
}

impl SimulatedRegistry {
    pub fn new(backends: Vec<Backend>) -> Self {
        let claims = Arc::new(Mutex::new(vec![false; backends.len()]));
        Self { backends, claims }
    }

    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }

    fn backend(&self, index: u32) -> Result<&Backend, DeviceError> {
        self.backends
            .get(index as usize)
            .ok_or(DeviceError::NoSuchDevice {
                index,
                count: self.count(),
            })
    }

    fn serial(index: u32) -> String {
        format!("{:08}", index + 1)
    }

    fn claim(&self, index: u32) -> Result<Claim, DeviceError> {
        let mut table = lock(&self.claims);
        let slot = table
            .get_mut(index as usize)
            .ok_or(DeviceError::NoSuchDevice {
                index,
                count: self.backends.len() as u32,
            })?;
        if *slot {
            return Err(DeviceError::OpenFailed(format!(
                "device {} is already in use",
                index
            )));
        }
        *slot = true;
        Ok(Claim {
            table: Arc::clone(&self.claims),
            index: index as usize,
        })
    }
}

impl DeviceRegistry for SimulatedRegistry {
    fn count(&self) -> u32 {
        self.backends.len() as u32
    }

    fn name(&self, index: u32) -> Option<String> {
        self.backends.get(index as usize).map(|backend| match backend {
            Backend::Tone(spec) => format!("Simulated tone ({:+} Hz)", spec.offset_hz),
            Backend::Replay(path) => format!("Replay of {}", path.display()),
        })
    }

    fn usb_strings(&self, index: u32) -> Result<UsbStrings, DeviceError> {
        let product = match self.backend(index)? {
            Backend::Tone(_) => "OsmoSDR (simulated tone)".to_string(),
            Backend::Replay(_) => "OsmoSDR (replay)".to_string(),
        };
        Ok(UsbStrings {
            vendor: "sysmocom".to_string(),
            product,
            serial: Self::serial(index),
        })
    }

    fn open(&self, index: u32) -> Result<Box<dyn Device>, DeviceError> {
        let backend = self.backend(index)?.clone();
        let claim = self.claim(index)?;
        let device: Box<dyn Device> = match backend {
            Backend::Tone(spec) => Box::new(ToneDevice::claimed(spec, claim, Self::serial(index))),
            Backend::Replay(path) => {
                // A failed open drops the claim, freeing the slot again.
                Box::new(ReplayDevice::claimed(&path, claim, Self::serial(index))?)
            }
        };
        debug!("opened device {}", index);
        Ok(device)
    }
}
