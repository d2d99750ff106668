//! Compute-shader kernels (spec §4.7).
//!
//! Each kernel ships a CPU reference (`*_cpu_ref`) that the GPU dispatch is
//! defined to match, used by the test suite where no physical device is
//! available (spec §8), plus the actual `.wgsl` source under `shaders/`
//! compiled into a `wgpu::ComputePipeline` by `PipelineManager`, grounded
//! on `oxbitnet`'s `PipelineManager` (one compiled pipeline per kernel,
//! held for the lifetime of the device).

pub mod activation;
pub mod attention;
pub mod gather;
pub mod matmul;
pub mod quant;
pub mod residual;
pub mod rmsnorm;
pub mod rope;
pub mod softmax;

use std::collections::HashMap;
use std::sync::Arc;

const MATMUL_SRC: &str = include_str!("shaders/matmul.wgsl");
const RMSNORM_SRC: &str = include_str!("shaders/rmsnorm.wgsl");
const ATTENTION_SRC: &str = include_str!("shaders/attention.wgsl");
const GATHER_SRC: &str = include_str!("shaders/gather.wgsl");
const ROPE_SRC: &str = include_str!("shaders/rope.wgsl");
const SOFTMAX_SRC: &str = include_str!("shaders/softmax.wgsl");
const RESIDUAL_SRC: &str = include_str!("shaders/residual.wgsl");
const ACTIVATION_SRC: &str = include_str!("shaders/activation.wgsl");
const QUANT_SRC: &str = include_str!("shaders/quant.wgsl");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelId {
    Matmul,
    RmsNorm,
    Attention,
    Gather,
    Rope,
    Softmax,
    Residual,
    Activation,
    Quant,
}

/// Compiles and caches one `wgpu::ComputePipeline` per kernel. Constructed
/// once per device and shared by every layer in a pipeline.
pub struct PipelineManager {
    device: Arc<wgpu::Device>,
    pipelines: HashMap<KernelId, wgpu::ComputePipeline>,
}

impl PipelineManager {
    pub fn new(device: Arc<wgpu::Device>) -> Self {
        Self {
            device,
            pipelines: HashMap::new(),
        }
    }

    fn source_for(id: KernelId) -> &'static str {
        match id {
            KernelId::Matmul => MATMUL_SRC,
            KernelId::RmsNorm => RMSNORM_SRC,
            KernelId::Attention => ATTENTION_SRC,
            KernelId::Gather => GATHER_SRC,
            KernelId::Rope => ROPE_SRC,
            KernelId::Softmax => SOFTMAX_SRC,
            KernelId::Residual => RESIDUAL_SRC,
            KernelId::Activation => ACTIVATION_SRC,
            KernelId::Quant => QUANT_SRC,
        }
    }

    /// Compile a kernel's pipeline lazily and cache it for reuse.
    pub fn get_or_compile(&mut self, id: KernelId) -> &wgpu::ComputePipeline {
        let device = self.device.clone();
        self.pipelines.entry(id).or_insert_with(|| {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(kernel_label(id)),
                source: wgpu::ShaderSource::Wgsl(Self::source_for(id).into()),
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(kernel_label(id)),
                layout: None,
                module: &module,
                entry_point: "main",
            })
        })
    }
}

fn kernel_label(id: KernelId) -> &'static str {
    match id {
        KernelId::Matmul => "doppler-matmul",
        KernelId::RmsNorm => "doppler-rmsnorm",
        KernelId::Attention => "doppler-attention",
        KernelId::Gather => "doppler-gather",
        KernelId::Rope => "doppler-rope",
        KernelId::Softmax => "doppler-softmax",
        KernelId::Residual => "doppler-residual",
        KernelId::Activation => "doppler-activation",
        KernelId::Quant => "doppler-quant",
    }
}
