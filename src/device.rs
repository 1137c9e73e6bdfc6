//! Compute device selection and GPU discovery.
//!
//! Device strings are `auto`, `cpu`, `cuda` or `cuda:N`. With the `cuda`
//! feature enabled, devices are enumerated through the CUDA driver; without
//! it the crate runs CPU-only and `auto` resolves to `cpu`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ServeError;

/// Information about a single GPU device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuDeviceInfo {
    /// Device index.
    pub id: usize,

    /// Device name (e.g., "NVIDIA Jetson AGX Orin").
    pub name: String,

    /// Total memory in bytes.
    pub total_memory: usize,
}

/// Requested compute device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSpec {
    /// Use the first CUDA device if present, otherwise CPU.
    Auto,
    Cpu,
    Cuda(usize),
}

/// A device after `auto` has been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda(usize),
}

impl FromStr for DeviceSpec {
    type Err = ServeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "auto" | "" => Ok(DeviceSpec::Auto),
            "cpu" => Ok(DeviceSpec::Cpu),
            "cuda" | "gpu" => Ok(DeviceSpec::Cuda(0)),
            other => other
                .strip_prefix("cuda:")
                .and_then(|idx| idx.parse().ok())
                .map(DeviceSpec::Cuda)
                .ok_or_else(|| ServeError::InvalidRequest(format!("unknown device '{other}'"))),
        }
    }
}

impl DeviceSpec {
    /// Resolve against the devices actually present.
    pub fn resolve(self, available: &[GpuDeviceInfo]) -> Device {
        match self {
            DeviceSpec::Cpu => Device::Cpu,
            DeviceSpec::Cuda(id) => Device::Cuda(id),
            DeviceSpec::Auto => available
                .first()
                .map(|d| Device::Cuda(d.id))
                .unwrap_or(Device::Cpu),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(id) => write!(f, "cuda:{id}"),
        }
    }
}

/// Detect all available GPU devices.
///
/// With the `cuda` feature enabled, queries the CUDA driver.
/// Without it, returns an empty list (CPU-only mode).
pub fn detect_devices() -> Vec<GpuDeviceInfo> {
    #[cfg(feature = "cuda")]
    {
        match detect_devices_cuda() {
            Ok(devices) => devices,
            Err(e) => {
                tracing::warn!(error = %e, "CUDA device query failed, using CPU");
                Vec::new()
            }
        }
    }

    #[cfg(not(feature = "cuda"))]
    {
        info!("CUDA not enabled, running in CPU-only mode");
        Vec::new()
    }
}

#[cfg(feature = "cuda")]
fn detect_devices_cuda() -> Result<Vec<GpuDeviceInfo>, cudarc::driver::DriverError> {
    use cudarc::driver::result;

    result::init()?;
    let count = result::device::get_count()?;
    let mut devices = Vec::with_capacity(count.max(0) as usize);
    for ordinal in 0..count {
        let dev = result::device::get(ordinal)?;
        let name = result::device::get_name(dev)?;
        // SAFETY: `dev` is a valid handle returned by the driver above.
        let total_memory = unsafe { result::device::total_mem(dev)? };
        devices.push(GpuDeviceInfo {
            id: ordinal as usize,
            name,
            total_memory,
        });
    }
    Ok(devices)
}

/// Resolve a device string, logging what was found.
pub fn select_device(spec: &str) -> Result<Device, ServeError> {
    let spec: DeviceSpec = spec.parse()?;
    let available = detect_devices();

    for gpu in &available {
        info!(
            id = gpu.id,
            name = %gpu.name,
            memory_gb = format!("{:.2}", gpu.total_memory as f64 / 1e9),
            "CUDA device"
        );
    }

    let device = spec.resolve(&available);
    info!(device = %device, cuda_available = !available.is_empty(), "Selected device");
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_orin() -> Vec<GpuDeviceInfo> {
        vec![GpuDeviceInfo {
            id: 0,
            name: "Orin".to_string(),
            total_memory: 64 * 1024 * 1024 * 1024,
        }]
    }

    #[test]
    fn test_parse_device_strings() {
        assert_eq!("auto".parse::<DeviceSpec>().unwrap(), DeviceSpec::Auto);
        assert_eq!("CPU".parse::<DeviceSpec>().unwrap(), DeviceSpec::Cpu);
        assert_eq!("cuda".parse::<DeviceSpec>().unwrap(), DeviceSpec::Cuda(0));
        assert_eq!("cuda:1".parse::<DeviceSpec>().unwrap(), DeviceSpec::Cuda(1));
        assert!("tpu".parse::<DeviceSpec>().is_err());
        assert!("cuda:x".parse::<DeviceSpec>().is_err());
    }

    #[test]
    fn test_auto_resolution() {
        assert_eq!(DeviceSpec::Auto.resolve(&[]), Device::Cpu);
        assert_eq!(DeviceSpec::Auto.resolve(&stub_orin()), Device::Cuda(0));
        assert_eq!(DeviceSpec::Cpu.resolve(&stub_orin()), Device::Cpu);
    }

    #[test]
    fn test_display() {
        assert_eq!(Device::Cpu.to_string(), "cpu");
        assert_eq!(Device::Cuda(2).to_string(), "cuda:2");
    }
}
