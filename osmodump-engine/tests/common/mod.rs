// Shared by several test binaries; not every helper is used by each.
#![allow(dead_code)]

use osmodump_engine::CancelContext;
use osmodump_engine::CancelFlag;
use osmodump_engine::device::{Device, DeviceCanceller, DeviceError, UsbStrings};
use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// A device operation, as seen by the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SetSampleRate(u32),
    SetCenterFrequency(u32),
    SetGainMode { auto: bool },
    SetGain(i32),
    ResetBuffer,
    ReadSync(usize),
    ReadAsync { queue_depth: u32, unit_size: u32 },
    Close,
}

#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn position(&self, call: &Call) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }
}

/// What the next `read_sync` does.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// Fill the whole buffer.
    Full,
    /// Return only this many bytes.
    Short(usize),
    /// Fail with this status.
    Fail(i32),
    /// Raise the cancel flag as a signal would, then fill the whole buffer.
    Signal,
}

/// How `read_async` ends once its units are delivered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AsyncEnd {
    Complete,
    Fail(i32),
    Signal,
}

/// Scripted device that records every call.
pub struct MockDevice {
    log: CallLog,
    gains: Vec<i32>,
    rates: Vec<u32>,
    sample_rate: u32,
    sync_script: VecDeque<Step>,
    async_units: usize,
    async_end: AsyncEnd,
    canceller: DeviceCanceller,
    flag: CancelFlag,
    next_byte: u8,
    pub fail_sample_rate: bool,
    pub fail_frequency: bool,
    pub fail_gain: bool,
    pub fail_reset: bool,
}

impl MockDevice {
    /// Device with gains `[0, 40]` and sample rates `[250000, 500000]`.
    pub fn new(flag: CancelFlag) -> Self {
        Self {
            log: CallLog::default(),
            gains: vec![0, 40],
            rates: vec![250_000, 500_000],
            sample_rate: 250_000,
            sync_script: VecDeque::new(),
            async_units: 0,
            async_end: AsyncEnd::Complete,
            canceller: DeviceCanceller::new(),
            flag,
            next_byte: 0,
            fail_sample_rate: false,
            fail_frequency: false,
            fail_gain: false,
            fail_reset: false,
        }
    }

    pub fn with_sync_script(mut self, steps: &[Step]) -> Self {
        self.sync_script = steps.iter().copied().collect();
        self
    }

    pub fn with_async_plan(mut self, units: usize, end: AsyncEnd) -> Self {
        self.async_units = units;
        self.async_end = end;
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    fn signal(&self) {
        CancelContext::new(self.flag.clone(), self.canceller.clone()).trigger();
    }

    fn fill(&mut self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *b = self.next_byte;
            self.next_byte = self.next_byte.wrapping_add(1);
        }
    }
}

/// The byte pattern a fresh mock produces for its first `len` bytes.
pub fn expected_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

fn refused(what: &str) -> DeviceError {
    DeviceError::Unsupported(what.to_string())
}

impl Device for MockDevice {
    fn set_sample_rate(&mut self, rate: u32) -> Result<u32, DeviceError> {
        self.log.push(Call::SetSampleRate(rate));
        if self.fail_sample_rate {
            return Err(refused("sample rate"));
        }
        self.sample_rate = self
            .rates
            .iter()
            .copied()
            .min_by_key(|r| r.abs_diff(rate))
            .unwrap_or(rate);
        Ok(self.sample_rate)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn set_center_frequency(&mut self, hz: u32) -> Result<(), DeviceError> {
        self.log.push(Call::SetCenterFrequency(hz));
        if self.fail_frequency {
            return Err(refused("frequency"));
        }
        Ok(())
    }

    fn set_gain_mode(&mut self, auto: bool) -> Result<(), DeviceError> {
        self.log.push(Call::SetGainMode { auto });
        Ok(())
    }

    fn set_gain(&mut self, tenths_db: i32) -> Result<(), DeviceError> {
        self.log.push(Call::SetGain(tenths_db));
        if self.fail_gain {
            return Err(refused("gain"));
        }
        Ok(())
    }

    fn gains(&self) -> Vec<i32> {
        self.gains.clone()
    }

    fn sample_rates(&self) -> Vec<u32> {
        self.rates.clone()
    }

    fn usb_strings(&self) -> Result<UsbStrings, DeviceError> {
        Ok(UsbStrings {
            vendor: "Mock".to_string(),
            product: "Scripted".to_string(),
            serial: "0".to_string(),
        })
    }

    fn reset_buffer(&mut self) -> Result<(), DeviceError> {
        self.log.push(Call::ResetBuffer);
        if self.fail_reset {
            return Err(DeviceError::ResetFailed("endpoint stalled".to_string()));
        }
        Ok(())
    }

    fn read_sync(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        self.log.push(Call::ReadSync(buf.len()));
        match self.sync_script.pop_front() {
            Some(Step::Full) => {
                self.fill(buf);
                Ok(buf.len())
            }
            Some(Step::Short(n)) => {
                let n = n.min(buf.len());
                self.fill(&mut buf[..n]);
                Ok(n)
            }
            Some(Step::Fail(status)) => Err(DeviceError::io(status, "scripted failure")),
            Some(Step::Signal) => {
                self.signal();
                self.fill(buf);
                Ok(buf.len())
            }
            None => Err(DeviceError::io(-99, "script exhausted")),
        }
    }

    fn read_async(
        &mut self,
        callback: &mut (dyn FnMut(&[u8]) + Send),
        queue_depth: u32,
        unit_size: u32,
    ) -> Result<(), DeviceError> {
        self.log.push(Call::ReadAsync {
            queue_depth,
            unit_size,
        });
        let mut buf = vec![0u8; unit_size as usize];
        for _ in 0..self.async_units {
            if self.canceller.is_cancelled() {
                return Ok(());
            }
            self.fill(&mut buf);
            callback(&buf);
        }
        if self.canceller.is_cancelled() {
            return Ok(());
        }
        match self.async_end {
            AsyncEnd::Complete => Ok(()),
            AsyncEnd::Fail(status) => Err(DeviceError::io(status, "transfer failed")),
            AsyncEnd::Signal => {
                self.signal();
                Ok(())
            }
        }
    }

    fn canceller(&self) -> DeviceCanceller {
        self.canceller.clone()
    }

    fn close(&mut self) {
        self.log.push(Call::Close);
    }
}

/// In-memory sink whose contents stay readable after the engine consumed it.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Accepts whole writes until write number `fail_on` (1-based), which fails.
pub struct FailingWriter {
    inner: SharedBuffer,
    fail_on: usize,
    writes: usize,
}

impl FailingWriter {
    pub fn new(inner: SharedBuffer, fail_on: usize) -> Self {
        Self {
            inner,
            fail_on,
            writes: 0,
        }
    }
}

impl Write for FailingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writes += 1;
        if self.writes >= self.fail_on {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "reader went away"));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
