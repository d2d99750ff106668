//! Device & capability probe (spec §4.4).
//!
//! Grounded on `oxbitnet`'s adapter-selection path (`wgpu::Instance` →
//! `request_adapter` → feature/limit inspection) since the teacher repo has
//! no GPU dependency at all.

use crate::error::{DopplerError, DopplerResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    /// Unified memory: up to ~60 GiB models.
    Tier1,
    /// Discrete GPU with 64-bit addressing: up to ~40 GiB MoE models.
    Tier2,
    /// Everything else: up to ~8 GiB.
    Tier3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub has_subgroups: bool,
    pub has_f16: bool,
    pub has_memory64: bool,
    pub is_unified_memory: bool,
    pub tier: Tier,
}

impl Capabilities {
    pub fn max_model_bytes(&self) -> u64 {
        match self.tier {
            Tier::Tier1 => 60 * 1024 * 1024 * 1024,
            Tier::Tier2 => 40 * 1024 * 1024 * 1024,
            Tier::Tier3 => 8 * 1024 * 1024 * 1024,
        }
    }
}

fn assign_tier(is_unified_memory: bool, has_memory64: bool) -> Tier {
    if is_unified_memory {
        Tier::Tier1
    } else if has_memory64 {
        Tier::Tier2
    } else {
        Tier::Tier3
    }
}

/// Holds the live `wgpu` device/queue and the capabilities derived from them.
/// Torn down by `Drop` — `wgpu::Device`/`Queue` release their resources when
/// the last `Arc` reference goes away, so there is no explicit teardown call
/// beyond dropping this handle (idempotent by construction: calling
/// `probe` again simply requests a fresh adapter).
pub struct DeviceHandle {
    pub device: std::sync::Arc<wgpu::Device>,
    pub queue: std::sync::Arc<wgpu::Queue>,
    pub capabilities: Capabilities,
}

/// Request an adapter and derive `Capabilities` from its reported features
/// and limits. Blocking: uses `pollster` to drive the async `wgpu` request
/// chain, matching the pipeline's "one synchronization point" cooperative
/// scheduling model (spec §5).
pub fn probe() -> DopplerResult<DeviceHandle> {
    let instance = wgpu::Instance::default();

    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))
    .ok_or_else(|| DopplerError::Capability("no compatible GPU adapter found".to_string()))?;

    let adapter_features = adapter.features();
    let adapter_limits = adapter.limits();
    let adapter_info = adapter.get_info();

    let has_f16 = adapter_features.contains(wgpu::Features::SHADER_F16);
    let has_subgroups = adapter_features.contains(wgpu::Features::SUBGROUP);
    let has_memory64 = adapter_limits.max_buffer_size >= (1u64 << 32);
    let is_unified_memory = matches!(
        adapter_info.device_type,
        wgpu::DeviceType::IntegratedGpu | wgpu::DeviceType::Cpu
    );

    let mut requested_features = wgpu::Features::empty();
    if has_f16 {
        requested_features |= wgpu::Features::SHADER_F16;
    }
    if has_subgroups {
        requested_features |= wgpu::Features::SUBGROUP;
    }

    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("doppler-device"),
            required_features: requested_features,
            required_limits: adapter_limits.clone(),
        },
        None,
    ))
    .map_err(|e| DopplerError::Capability(format!("device request failed: {e}")))?;

    let tier = assign_tier(is_unified_memory, has_memory64);

    Ok(DeviceHandle {
        device: std::sync::Arc::new(device),
        queue: std::sync::Arc::new(queue),
        capabilities: Capabilities {
            has_subgroups,
            has_f16,
            has_memory64,
            is_unified_memory,
            tier,
        },
    })
}
