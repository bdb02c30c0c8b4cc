use std::str::FromStr;

use candle::Device;
use tracing::info;

use crate::error::{ScoreError, ScoreResult};

/// Where the classifier should run. Decided once, before the model loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    #[default]
    Auto,
    Cpu,
    Cuda(usize),
}

impl FromStr for DevicePreference {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.is_empty() || lower == "auto" {
            Ok(Self::Auto)
        } else if lower == "cpu" {
            Ok(Self::Cpu)
        } else if lower.starts_with("cuda") || lower.starts_with("gpu") {
            match trimmed.split(':').nth(1) {
                None => Ok(Self::Cuda(0)),
                Some(part) => part
                    .trim()
                    .parse::<usize>()
                    .map(Self::Cuda)
                    .map_err(|_| format!("invalid CUDA ordinal in '{trimmed}'")),
            }
        } else {
            Err(format!("unrecognized device '{trimmed}'"))
        }
    }
}

/// Auto falls back to CPU quietly; an explicit CUDA request that cannot be
/// honoured is a startup failure.
pub fn select_device(pref: DevicePreference) -> ScoreResult<Device> {
    let device = match pref {
        DevicePreference::Cpu => Device::Cpu,
        DevicePreference::Auto => Device::cuda_if_available(0).unwrap_or(Device::Cpu),
        DevicePreference::Cuda(ordinal) => Device::new_cuda(ordinal).map_err(|err| {
            ScoreError::ModelUnavailable(format!(
                "requested CUDA device {ordinal} but initialization failed ({err}). \
                 Build with the `cuda` feature and ensure CUDA libraries are available."
            ))
        })?,
    };
    info!(device = device_label(&device), "classifier device selected");
    Ok(device)
}

pub fn device_label(device: &Device) -> &'static str {
    if device.is_cuda() {
        "cuda"
    } else if device.is_metal() {
        "metal"
    } else {
        "cpu"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_preferences() {
        assert_eq!("auto".parse::<DevicePreference>(), Ok(DevicePreference::Auto));
        assert_eq!("".parse::<DevicePreference>(), Ok(DevicePreference::Auto));
        assert_eq!(" CPU ".parse::<DevicePreference>(), Ok(DevicePreference::Cpu));
        assert_eq!("cuda".parse::<DevicePreference>(), Ok(DevicePreference::Cuda(0)));
        assert_eq!("cuda:1".parse::<DevicePreference>(), Ok(DevicePreference::Cuda(1)));
        assert_eq!("gpu:2".parse::<DevicePreference>(), Ok(DevicePreference::Cuda(2)));
        assert!("cuda:x".parse::<DevicePreference>().is_err());
        assert!("tpu".parse::<DevicePreference>().is_err());
    }

    #[test]
    fn cpu_preference_always_resolves() {
        let device = select_device(DevicePreference::Cpu).unwrap();
        assert_eq!(device_label(&device), "cpu");
    }

    #[test]
    fn auto_never_fails() {
        assert!(select_device(DevicePreference::Auto).is_ok());
    }
}
