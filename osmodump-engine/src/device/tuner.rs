use super::DeviceError;
use log::debug;

/// Sample rates the simulated hardware can run at, in Hz.
pub const SUPPORTED_SAMPLE_RATES: [u32; 6] =
    [250_000, 500_000, 1_000_000, 1_024_000, 2_048_000, 3_200_000];

/// Tuner gain steps in tenths of a dB.
pub const SUPPORTED_GAINS: [i32; 29] = [
    0, 9, 14, 27, 37, 77, 87, 125, 144, 157, 166, 197, 207, 229, 254, 280, 297, 328, 338, 364,
    372, 386, 402, 421, 434, 439, 445, 480, 496,
];

const MIN_FREQUENCY: u32 = 24_000_000;
const MAX_FREQUENCY: u32 = 1_766_000_000;

/// Configuration registers of a simulated tuner. Requests are quantized the
/// way real hardware does it, so callers must read applied values back.
#[derive(Debug, Clone)]
pub struct Tuner {
    sample_rate: u32,
    center_frequency: u32,
    auto_gain: bool,
    gain: i32,
}

impl Default for Tuner {
    fn default() -> Self {
        Self {
            sample_rate: SUPPORTED_SAMPLE_RATES[1],
            center_frequency: 100_000_000,
            auto_gain: true,
            gain: 0,
        }
    }
}

fn nearest<T: Copy>(values: &[T], distance: impl Fn(T) -> u64) -> Option<T> {
    values.iter().copied().min_by_key(|&v| distance(v))
}

impl Tuner {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn center_frequency(&self) -> u32 {
        self.center_frequency
    }

    pub fn auto_gain(&self) -> bool {
        self.auto_gain
    }

    /// Gain currently in effect, in tenths of a dB.
    pub fn gain(&self) -> i32 {
        self.gain
    }

    pub fn set_sample_rate(&mut self, rate: u32) -> Result<u32, DeviceError> {
        let min = SUPPORTED_SAMPLE_RATES[0];
        let max = SUPPORTED_SAMPLE_RATES[SUPPORTED_SAMPLE_RATES.len() - 1];
        if rate < min / 2 || rate > max + max / 4 {
            return Err(DeviceError::Unsupported(format!(
                "sample rate {} Hz outside {}..{} Hz",
                rate, min, max
            )));
        }
        let actual = nearest(&SUPPORTED_SAMPLE_RATES, |r| r.abs_diff(rate) as u64)
            .unwrap_or(self.sample_rate);
        if actual != rate {
            debug!("sample rate {} Hz quantized to {} Hz", rate, actual);
        }
        self.sample_rate = actual;
        Ok(actual)
    }

    pub fn set_center_frequency(&mut self, hz: u32) -> Result<(), DeviceError> {
        if !(MIN_FREQUENCY..=MAX_FREQUENCY).contains(&hz) {
            return Err(DeviceError::Unsupported(format!(
                "frequency {} Hz outside tuning range",
                hz
            )));
        }
        self.center_frequency = hz;
        Ok(())
    }

    pub fn set_gain_mode(&mut self, auto: bool) -> Result<(), DeviceError> {
        self.auto_gain = auto;
        Ok(())
    }

    pub fn set_gain(&mut self, tenths_db: i32) -> Result<(), DeviceError> {
        if self.auto_gain {
            return Err(DeviceError::Unsupported(
                "manual gain requested while in automatic gain mode".to_string(),
            ));
        }
        let min = SUPPORTED_GAINS[0];
        let max = SUPPORTED_GAINS[SUPPORTED_GAINS.len() - 1];
        if !(min..=max).contains(&tenths_db) {
            return Err(DeviceError::Unsupported(format!(
                "gain {:.1} dB outside {:.1}..{:.1} dB",
                tenths_db as f32 / 10.0,
                min as f32 / 10.0,
                max as f32 / 10.0
            )));
        }
        self.gain = nearest(&SUPPORTED_GAINS, |g| g.abs_diff(tenths_db) as u64).unwrap_or(0);
        Ok(())
    }

    pub fn gains(&self) -> Vec<i32> {
        SUPPORTED_GAINS.to_vec()
    }

    pub fn sample_rates(&self) -> Vec<u32> {
        SUPPORTED_SAMPLE_RATES.to_vec()
    }
}
