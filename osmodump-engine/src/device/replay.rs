use super::registry::Claim;
use super::transfer::stream_units;
use super::tuner::Tuner;
use super::{Device, DeviceCanceller, DeviceError, UsbStrings, status};
use log::{debug, info};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Simulated receiver that streams the raw bytes of a capture file.
///
/// Tuning requests are accepted and quantized like real hardware but do not
/// alter the data. End of file ends the stream.
pub struct ReplayDevice {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    tuner: Tuner,
    canceller: DeviceCanceller,
    claim: Option<Claim>,
    serial: String,
}

fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

fn io_error(e: io::Error) -> DeviceError {
    DeviceError::io(status::IO, e.to_string())
}

impl ReplayDevice {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DeviceError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| DeviceError::OpenFailed(format!("{}: {}", path.display(), e)))?;
        info!("replaying samples from {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            reader: Some(BufReader::with_capacity(1024 * 1024, file)),
            tuner: Tuner::default(),
            canceller: DeviceCanceller::new(),
            claim: None,
            serial: "00000001".to_string(),
        })
    }

    pub(super) fn claimed(path: &Path, claim: Claim, serial: String) -> Result<Self, DeviceError> {
        let mut device = Self::open(path)?;
        device.claim = Some(claim);
        device.serial = serial;
        Ok(device)
    }

    fn reader(&mut self) -> Result<&mut BufReader<File>, DeviceError> {
        self.reader
            .as_mut()
            .ok_or_else(|| DeviceError::io(status::IO, "device is closed"))
    }
}

impl Device for ReplayDevice {
    fn set_sample_rate(&mut self, rate: u32) -> Result<u32, DeviceError> {
        self.tuner.set_sample_rate(rate)
    }

    fn sample_rate(&self) -> u32 {
        self.tuner.sample_rate()
    }

    fn set_center_frequency(&mut self, hz: u32) -> Result<(), DeviceError> {
        self.tuner.set_center_frequency(hz)
    }

    fn set_gain_mode(&mut self, auto: bool) -> Result<(), DeviceError> {
        self.tuner.set_gain_mode(auto)
    }

    fn set_gain(&mut self, tenths_db: i32) -> Result<(), DeviceError> {
        self.tuner.set_gain(tenths_db)
    }

    fn gains(&self) -> Vec<i32> {
        self.tuner.gains()
    }

    fn sample_rates(&self) -> Vec<u32> {
        self.tuner.sample_rates()
    }

    fn usb_strings(&self) -> Result<UsbStrings, DeviceError> {
        Ok(UsbStrings {
            vendor: "sysmocom".to_string(),
            product: "OsmoSDR (replay)".to_string(),
            serial: self.serial.clone(),
        })
    }

    /// Rewinds to the start of the capture.
    fn reset_buffer(&mut self) -> Result<(), DeviceError> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| DeviceError::ResetFailed("device is closed".to_string()))?;
        reader
            .seek(SeekFrom::Start(0))
            .map_err(|e| DeviceError::ResetFailed(e.to_string()))?;
        Ok(())
    }

    fn read_sync(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        if self.canceller.is_cancelled() {
            return Err(DeviceError::io(status::INTERRUPTED, "read cancelled"));
        }
        read_full(self.reader()?, buf).map_err(io_error)
    }

    fn read_async(
        &mut self,
        callback: &mut (dyn FnMut(&[u8]) + Send),
        queue_depth: u32,
        unit_size: u32,
    ) -> Result<(), DeviceError> {
        let canceller = self.canceller.clone();
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| DeviceError::io(status::IO, "device is closed"))?;
        stream_units(&canceller, callback, queue_depth, unit_size, |buf| {
            read_full(reader, buf).map_err(io_error)
        })
    }

    fn canceller(&self) -> DeviceCanceller {
        self.canceller.clone()
    }

    fn close(&mut self) {
        if self.reader.take().is_some() {
            debug!("closed replay of {}", self.path.display());
        }
        self.claim = None;
    }
}
