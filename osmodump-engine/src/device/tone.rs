use super::registry::Claim;
use super::transfer::{POLL_INTERVAL, stream_units};
use super::tuner::Tuner;
use super::{Device, DeviceCanceller, DeviceError, UsbStrings, status};
use log::debug;
use num_complex::Complex;
use osmodump_messages::TenthsDb;
use std::f32::consts::TAU;
use std::thread;
use std::time::{Duration, Instant};

/// Parameters of the synthesized test signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneSpec {
    /// Tone position relative to the center frequency, in Hz.
    pub offset_hz: f32,
    /// Tone level relative to full scale at 0 dB gain, in dB.
    pub level_db: f32,
    /// Pace output to the sample rate, like a real receiver.
    pub throttle: bool,
}

impl Default for ToneSpec {
    fn default() -> Self {
        Self {
            offset_hz: 10_000.0,
            level_db: -20.0,
            throttle: true,
        }
    }
}

/// Generates interleaved unsigned 8-bit I/Q for a single complex tone.
#[derive(Debug)]
struct Oscillator {
    phase: Complex<f32>,
    step: Complex<f32>,
    amplitude: f32,
    emitted: u64,
}

impl Oscillator {
    fn new() -> Self {
        Self {
            phase: Complex::new(1.0, 0.0),
            step: Complex::new(1.0, 0.0),
            amplitude: 0.0,
            emitted: 0,
        }
    }

    fn retune(&mut self, offset_hz: f32, sample_rate: u32, amplitude: f32) {
        self.step = Complex::from_polar(1.0, TAU * offset_hz / sample_rate as f32);
        self.amplitude = amplitude.min(1.0);
    }

    fn fill(&mut self, buf: &mut [u8]) {
        for pair in buf.chunks_exact_mut(2) {
            let s = self.phase * self.amplitude;
            pair[0] = (s.re * 127.5 + 127.5).round().clamp(0.0, 255.0) as u8;
            pair[1] = (s.im * 127.5 + 127.5).round().clamp(0.0, 255.0) as u8;
            self.phase *= self.step;
            self.emitted += 1;
            // Keep the rotator on the unit circle.
            if self.emitted % 1024 == 0 {
                self.phase /= self.phase.norm();
            }
        }
        if buf.len() % 2 == 1 {
            if let Some(last) = buf.last_mut() {
                *last = 128;
            }
        }
    }
}

/// Simulated receiver producing a test tone.
pub struct ToneDevice {
    tuner: Tuner,
    spec: ToneSpec,
    oscillator: Oscillator,
    canceller: DeviceCanceller,
    claim: Option<Claim>,
    serial: String,
    closed: bool,
}

impl ToneDevice {
    pub fn new(spec: ToneSpec) -> Self {
        let mut device = Self {
            tuner: Tuner::default(),
            spec,
            oscillator: Oscillator::new(),
            canceller: DeviceCanceller::new(),
            claim: None,
            serial: "00000001".to_string(),
            closed: false,
        };
        device.retune();
        device
    }

    pub(super) fn claimed(spec: ToneSpec, claim: Claim, serial: String) -> Self {
        let mut device = Self::new(spec);
        device.claim = Some(claim);
        device.serial = serial;
        device
    }

    fn retune(&mut self) {
        // Manual gain is relative to a 20 dB midpoint; auto gain sits on it.
        let gain = if self.tuner.auto_gain() {
            0
        } else {
            self.tuner.gain() - 200
        };
        let level = TenthsDb::from_db(self.spec.level_db);
        let amplitude = TenthsDb(level.as_tenths() + gain).to_linear();
        self.oscillator
            .retune(self.spec.offset_hz, self.tuner.sample_rate(), amplitude);
    }

    fn ensure_open(&self) -> Result<(), DeviceError> {
        if self.closed {
            return Err(DeviceError::io(status::IO, "device is closed"));
        }
        Ok(())
    }
}

/// Sleeps so that `samples` worth of output is not released before real time.
#[derive(Debug)]
struct Pacer {
    start: Instant,
    samples: u64,
    sample_rate: u32,
}

impl Pacer {
    fn new(sample_rate: u32) -> Self {
        Self {
            start: Instant::now(),
            samples: 0,
            sample_rate,
        }
    }

    /// Wait until `samples` more samples are due. Returns false if cancelled.
    fn wait(&mut self, samples: u64, canceller: &DeviceCanceller) -> bool {
        self.samples += samples;
        let due = self.start
            + Duration::from_secs_f64(self.samples as f64 / self.sample_rate.max(1) as f64);
        loop {
            if canceller.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= due {
                return true;
            }
            thread::sleep((due - now).min(POLL_INTERVAL));
        }
    }
}

impl Device for ToneDevice {
    fn set_sample_rate(&mut self, rate: u32) -> Result<u32, DeviceError> {
        let actual = self.tuner.set_sample_rate(rate)?;
        self.retune();
        Ok(actual)
    }

    fn sample_rate(&self) -> u32 {
        self.tuner.sample_rate()
    }

    fn set_center_frequency(&mut self, hz: u32) -> Result<(), DeviceError> {
        self.tuner.set_center_frequency(hz)
    }

    fn set_gain_mode(&mut self, auto: bool) -> Result<(), DeviceError> {
        self.tuner.set_gain_mode(auto)?;
        self.retune();
        Ok(())
    }

    fn set_gain(&mut self, tenths_db: i32) -> Result<(), DeviceError> {
        self.tuner.set_gain(tenths_db)?;
        self.retune();
        Ok(())
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
            product: "OsmoSDR (simulated tone)".to_string(),
            serial: self.serial.clone(),
        })
    }

    fn reset_buffer(&mut self) -> Result<(), DeviceError> {
        self.ensure_open()
            .map_err(|e| DeviceError::ResetFailed(e.to_string()))?;
        self.oscillator.phase = Complex::new(1.0, 0.0);
        Ok(())
    }

    fn read_sync(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        self.ensure_open()?;
        if self.canceller.is_cancelled() {
            return Err(DeviceError::io(status::INTERRUPTED, "read cancelled"));
        }
        self.oscillator.fill(buf);
        if self.spec.throttle {
            let mut pacer = Pacer::new(self.tuner.sample_rate());
            if !pacer.wait(buf.len() as u64 / 2, &self.canceller) {
                return Err(DeviceError::io(status::INTERRUPTED, "read cancelled"));
            }
        }
        Ok(buf.len())
    }

    fn read_async(
        &mut self,
        callback: &mut (dyn FnMut(&[u8]) + Send),
        queue_depth: u32,
        unit_size: u32,
    ) -> Result<(), DeviceError> {
        self.ensure_open()?;
        let throttle = self.spec.throttle;
        let canceller = self.canceller.clone();
        let mut pacer = Pacer::new(self.tuner.sample_rate());
        let oscillator = &mut self.oscillator;
        debug!(
            "tone device streaming {} x {} byte transfers",
            queue_depth, unit_size
        );
        stream_units(&canceller, callback, queue_depth, unit_size, |buf| {
            oscillator.fill(buf);
            if throttle && !pacer.wait(buf.len() as u64 / 2, &canceller) {
                return Ok(0);
            }
            Ok(buf.len())
        })
    }

    fn canceller(&self) -> DeviceCanceller {
        self.canceller.clone()
    }

    fn close(&mut self) {
        if self.claim.take().is_some() {
            debug!("released tone device {}", self.serial);
        }
        self.closed = true;
    }
}
