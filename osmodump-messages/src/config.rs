use crate::{Hertz, TenthsDb};
use std::path::PathBuf;

pub const DEFAULT_SAMPLE_RATE: u32 = 500_000;
pub const DEFAULT_CENTER_FREQUENCY: u32 = 100_000_000;
pub const DEFAULT_ASYNC_BUF_NUMBER: u32 = 32;
pub const DEFAULT_BUF_LENGTH: u32 = 16 * 16384;
pub const MINIMAL_BUF_LENGTH: u32 = 512;
pub const MAXIMAL_BUF_LENGTH: u32 = 256 * 16384;

/// Requested operating parameters for one receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    pub sample_rate: Hertz,
    pub center_frequency: Hertz,
    /// `None` (or zero) selects automatic gain.
    pub gain: Option<TenthsDb>,
    /// Bytes per transfer unit, before range checking.
    pub block_size: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            sample_rate: Hertz(DEFAULT_SAMPLE_RATE),
            center_frequency: Hertz(DEFAULT_CENTER_FREQUENCY),
            gain: None,
            block_size: DEFAULT_BUF_LENGTH,
        }
    }
}

impl DeviceConfig {
    pub fn block_size_in_range(&self) -> bool {
        (MINIMAL_BUF_LENGTH..=MAXIMAL_BUF_LENGTH).contains(&self.block_size)
    }

    /// The block size the acquisition loop actually uses. Out-of-range
    /// requests fall back to `DEFAULT_BUF_LENGTH`.
    pub fn effective_block_size(&self) -> u32 {
        if self.block_size_in_range() {
            self.block_size
        } else {
            DEFAULT_BUF_LENGTH
        }
    }

    pub fn gain_setting(&self) -> GainSetting {
        match self.gain {
            None | Some(TenthsDb(0)) => GainSetting::Auto,
            Some(gain) => GainSetting::Manual(gain),
        }
    }
}

/// How the tuner gain is managed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainSetting {
    Auto,
    Manual(TenthsDb),
}

impl std::fmt::Display for GainSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GainSetting::Auto => write!(f, "auto"),
            GainSetting::Manual(gain) => write!(f, "{}", gain),
        }
    }
}

/// How samples are pulled from the device. Fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    /// One blocking read per transfer unit.
    Sync,
    /// One blocking call delivering transfer units through a callback.
    #[default]
    Async,
}

/// Where sample bytes are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    File(PathBuf),
}

impl OutputTarget {
    /// The filename reserved for standard output.
    pub const STDOUT_NAME: &'static str = "-";

    pub fn from_name(name: &str) -> Self {
        if name == Self::STDOUT_NAME {
            OutputTarget::Stdout
        } else {
            OutputTarget::File(PathBuf::from(name))
        }
    }
}

impl std::fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputTarget::Stdout => write!(f, "<stdout>"),
            OutputTarget::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Everything the engine needs for one acquisition run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionConfig {
    pub device: DeviceConfig,
    pub mode: TransferMode,
    pub output: OutputTarget,
}

impl AcquisitionConfig {
    pub fn new(device: DeviceConfig, mode: TransferMode, output: OutputTarget) -> Self {
        Self {
            device,
            mode,
            output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_block(block_size: u32) -> DeviceConfig {
        DeviceConfig {
            block_size,
            ..DeviceConfig::default()
        }
    }

    #[test]
    fn test_out_of_range_block_sizes_use_default() {
        for size in [0, 1, 511, MAXIMAL_BUF_LENGTH + 1, u32::MAX] {
            assert_eq!(with_block(size).effective_block_size(), 262_144, "size {}", size);
        }
    }

    #[test]
    fn test_in_range_block_sizes_are_kept() {
        for size in [512, 513, 4096, 262_144, 1_000_000, MAXIMAL_BUF_LENGTH] {
            assert_eq!(with_block(size).effective_block_size(), size);
        }
    }

    #[test]
    fn test_zero_or_missing_gain_is_auto() {
        let mut config = DeviceConfig::default();
        assert_eq!(config.gain_setting(), GainSetting::Auto);

        config.gain = Some(TenthsDb(0));
        assert_eq!(config.gain_setting(), GainSetting::Auto);

        config.gain = Some(TenthsDb(-10));
        assert_eq!(config.gain_setting(), GainSetting::Manual(TenthsDb(-10)));
    }

    #[test]
    fn test_output_target_from_name() {
        assert_eq!(OutputTarget::from_name("-"), OutputTarget::Stdout);
        assert_eq!(
            OutputTarget::from_name("capture.bin"),
            OutputTarget::File(PathBuf::from("capture.bin"))
        );
    }
}
