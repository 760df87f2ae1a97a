//! Compute device selection
//!
//! Picks the accelerator for model loading and training, falling back to
//! CPU when the requested backend is unavailable or not compiled in.

use anyhow::Result;
use candle_core::Device;
use serde::{Deserialize, Serialize};

/// Requested compute device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DevicePreference {
    Cuda,
    Metal,
    Cpu,
    #[default]
    Auto,
}

impl std::str::FromStr for DevicePreference {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cuda" | "gpu" => Ok(Self::Cuda),
            "metal" => Ok(Self::Metal),
            "cpu" => Ok(Self::Cpu),
            "auto" => Ok(Self::Auto),
            _ => Err(anyhow::anyhow!(
                "Invalid device preference: {}. Valid options: cuda, metal, cpu, auto",
                s
            )),
        }
    }
}

impl std::fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cuda => write!(f, "cuda"),
            Self::Metal => write!(f, "metal"),
            Self::Cpu => write!(f, "cpu"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

fn try_cuda() -> Option<Device> {
    #[cfg(feature = "cuda")]
    {
        Device::new_cuda(0).ok()
    }
    #[cfg(not(feature = "cuda"))]
    {
        None
    }
}

fn try_metal() -> Option<Device> {
    #[cfg(feature = "metal")]
    {
        Device::new_metal(0).ok()
    }
    #[cfg(not(feature = "metal"))]
    {
        None
    }
}

/// Resolve a device preference to a concrete device
///
/// An explicit GPU request that cannot be satisfied falls back to CPU with
/// a warning rather than failing, so the same config runs everywhere.
pub fn select_device(preference: DevicePreference) -> Result<Device> {
    match preference {
        DevicePreference::Cuda => match try_cuda() {
            Some(device) => {
                tracing::info!("✓ CUDA device selected");
                Ok(device)
            }
            None => {
                tracing::warn!("CUDA requested but unavailable, falling back to CPU");
                Ok(Device::Cpu)
            }
        },

        DevicePreference::Metal => match try_metal() {
            Some(device) => {
                tracing::info!("✓ Metal device selected");
                Ok(device)
            }
            None => {
                tracing::warn!("Metal requested but unavailable, falling back to CPU");
                Ok(Device::Cpu)
            }
        },

        DevicePreference::Cpu => {
            tracing::info!("✓ CPU device selected");
            Ok(Device::Cpu)
        }

        DevicePreference::Auto => {
            if let Some(device) = try_cuda() {
                tracing::info!("✓ Auto-selected: CUDA GPU");
                return Ok(device);
            }
            if let Some(device) = try_metal() {
                tracing::info!("✓ Auto-selected: Metal GPU");
                return Ok(device);
            }
            tracing::info!("✓ Auto-selected: CPU");
            Ok(Device::Cpu)
        }
    }
}

/// Short label for a device, for log and report output
pub fn device_label(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}

/// Whether a working CUDA device can be created
pub fn is_cuda_available() -> bool {
    try_cuda().is_some()
}

/// Whether a working Metal device can be created
pub fn is_metal_available() -> bool {
    try_metal().is_some()
}

/// Whether CUDA support was compiled in
pub fn is_cuda_compiled() -> bool {
    cfg!(feature = "cuda")
}

/// Whether Metal support was compiled in
pub fn is_metal_compiled() -> bool {
    cfg!(feature = "metal")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_preference_from_str() {
        assert_eq!(
            "cuda".parse::<DevicePreference>().unwrap(),
            DevicePreference::Cuda
        );
        assert_eq!(
            "GPU".parse::<DevicePreference>().unwrap(),
            DevicePreference::Cuda
        );
        assert_eq!(
            "cpu".parse::<DevicePreference>().unwrap(),
            DevicePreference::Cpu
        );
        assert!("tpu".parse::<DevicePreference>().is_err());
    }

    #[test]
    fn test_cpu_always_available() {
        let device = select_device(DevicePreference::Cpu);
        assert!(device.is_ok());
        assert_eq!(device_label(&device.unwrap()), "cpu");
    }

    #[test]
    fn test_auto_never_fails() {
        assert!(select_device(DevicePreference::Auto).is_ok());
    }
}
