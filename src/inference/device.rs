use candle_core::Device;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::inference::model::DeviceKind;

pub fn select_device(force_cpu: bool) -> Device {
    if force_cpu {
        info!("Using CPU device");
        return Device::Cpu;
    }

    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => {
                info!("Using CUDA device");
                return device;
            }
            Err(e) => tracing::warn!("CUDA not available: {}, falling back to CPU", e),
        }
    }

    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => {
                info!("Using Metal device");
                return device;
            }
            Err(e) => tracing::warn!("Metal not available: {}, falling back to CPU", e),
        }
    }

    info!(
        "Using CPU device, supported features: avx: {}, neon: {}, simd128: {}, f16c: {}",
        candle_core::utils::with_avx(),
        candle_core::utils::with_neon(),
        candle_core::utils::with_simd128(),
        candle_core::utils::with_f16c()
    );
    Device::Cpu
}

pub fn device_kind(device: &Device) -> DeviceKind {
    match device {
        Device::Cpu => DeviceKind::Cpu,
        Device::Cuda(_) => DeviceKind::Cuda,
        Device::Metal(_) => DeviceKind::Metal,
    }
}

/// Best-effort memory figures reported by the health endpoint.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct MemoryReport {
    pub allocated: String,
    pub cached: String,
}

impl MemoryReport {
    pub fn sample(device: DeviceKind) -> Self {
        let unavailable = match device {
            DeviceKind::Cpu => "N/A (CPU)",
            DeviceKind::Cuda => "N/A (CUDA)",
            DeviceKind::Metal => "N/A (Metal)",
        };
        let allocated = match device {
            DeviceKind::Cpu => resident_set_bytes(),
            DeviceKind::Cuda => cuda_memory().map(|(free, total)| used_bytes(free, total)),
            DeviceKind::Metal => None,
        };
        MemoryReport {
            allocated: allocated.map_or_else(|| unavailable.to_string(), format_gb),
            cached: unavailable.to_string(),
        }
    }
}

fn used_bytes(free: usize, total: usize) -> u64 {
    total.saturating_sub(free) as u64
}

/// Free and total memory of the first CUDA device.
#[cfg(feature = "cuda")]
fn cuda_memory() -> Option<(usize, usize)> {
    use candle_core::cuda_backend::cudarc::driver::{result, CudaContext};

    let context = CudaContext::new(0).ok()?;
    context.bind_to_thread().ok()?;
    result::mem_get_info().ok()
}

#[cfg(not(feature = "cuda"))]
fn cuda_memory() -> Option<(usize, usize)> {
    None
}

fn format_gb(bytes: u64) -> String {
    format!("{:.2}GB", bytes as f64 / 1024_f64.powi(3))
}

#[cfg(target_os = "linux")]
fn resident_set_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_vm_rss(&status)
}

#[cfg(not(target_os = "linux"))]
fn resident_set_bytes() -> Option<u64> {
    None
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib * 1024)
}
