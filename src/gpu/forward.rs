//! GPU dispatch wrappers: one function per kernel, each mirroring its
//! `kernels::*::*_cpu_ref` counterpart's signature (host f32 slices in,
//! `Vec<f32>` out) but doing the real upload -> dispatch -> readback round
//! trip instead of computing on the CPU. Grounded on `oxbitnet`'s per-op
//! dispatch pattern: one bind group built from `get_bind_group_layout(0)`,
//! one command encoder per op, synchronous readback through a `MAP_READ`
//! staging buffer and `device.poll(Maintain::Wait)`.
//!
//! `Pipeline::run_layers`/`project_logits` call into these when a device is
//! present; `layer::execute_layer_cpu_ref` and the `kernels::*::cpu_ref`
//! functions remain the reference the numbers here are defined to match,
//! and the only path exercised in headless test runs (spec §8).
//!
//! `gather`, `softmax`, and `dequantize_f16` have dispatch wrappers here
//! like every other kernel, but nothing on the hot per-layer path calls
//! them: embedding lookup happens once per `prefill`/`decode` call (not
//! once per layer) and stays host-side either way, router softmax is a
//! `num_experts`-long vector the MoE FFN already keeps on the host (see
//! `layer::moe::moe_ffn_gpu`), and `matmul`'s quantized operand is
//! dequantized host-side before upload rather than through this module's
//! F16 kernel. They're exercised directly by `kernels::{gather,softmax,quant}`'s
//! own tests against their `_cpu_ref` counterparts.

use crate::device::DeviceHandle;
use crate::error::{DopplerError, DopplerResult};
use crate::gpu::buffer::{BufferUsage, DtypeTag};
use crate::gpu::pool::BufferPool;
use crate::kernels::{KernelId, PipelineManager};
use crate::package::Dtype;
use std::sync::mpsc;

fn upload_f32(queue: &wgpu::Queue, pool: &mut BufferPool, data: &[f32], label: &str) -> DopplerResult<crate::gpu::buffer::DeviceBuffer> {
    let bytes: &[u8] = bytemuck::cast_slice(data);
    let size = (bytes.len().max(4)) as u64;
    let buf = pool.acquire(
        size,
        DtypeTag::F32,
        BufferUsage::STORAGE | BufferUsage::COPY_DST | BufferUsage::COPY_SRC,
        Some(label),
    )?;
    if !bytes.is_empty() {
        queue.write_buffer(buf.raw(), 0, bytes);
    }
    Ok(buf)
}

fn upload_u32(queue: &wgpu::Queue, pool: &mut BufferPool, data: &[u32], label: &str) -> DopplerResult<crate::gpu::buffer::DeviceBuffer> {
    let bytes: &[u8] = bytemuck::cast_slice(data);
    let size = (bytes.len().max(4)) as u64;
    let buf = pool.acquire(
        size,
        DtypeTag::I32,
        BufferUsage::STORAGE | BufferUsage::COPY_DST | BufferUsage::COPY_SRC,
        Some(label),
    )?;
    if !bytes.is_empty() {
        queue.write_buffer(buf.raw(), 0, bytes);
    }
    Ok(buf)
}

fn uniform<T: bytemuck::Pod>(queue: &wgpu::Queue, pool: &mut BufferPool, value: T, label: &str) -> DopplerResult<crate::gpu::buffer::DeviceBuffer> {
    let bytes = bytemuck::bytes_of(&value);
    let buf = pool.acquire(bytes.len() as u64, DtypeTag::F32, BufferUsage::UNIFORM | BufferUsage::COPY_DST, Some(label))?;
    queue.write_buffer(buf.raw(), 0, bytes);
    Ok(buf)
}

fn output_buffer(pool: &mut BufferPool, elements: usize, label: &str) -> DopplerResult<crate::gpu::buffer::DeviceBuffer> {
    let size = (elements.max(1) * 4) as u64;
    pool.acquire(size, DtypeTag::F32, BufferUsage::STORAGE | BufferUsage::COPY_SRC, Some(label))
}

/// Copy `out_buf`'s GPU contents back to the host, blocking until the map
/// completes (spec §5: the pipeline is a single synchronization point).
fn readback_f32(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    pool: &mut BufferPool,
    out_buf: crate::gpu::buffer::DeviceBuffer,
    elements: usize,
) -> DopplerResult<Vec<f32>> {
    let byte_len = (elements * 4) as u64;
    let staging = pool.acquire(
        byte_len.max(4),
        DtypeTag::F32,
        BufferUsage::MAPPED_READ | BufferUsage::COPY_DST,
        Some("doppler-readback-staging"),
    )?;

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("doppler-readback-copy"),
    });
    encoder.copy_buffer_to_buffer(out_buf.raw(), 0, staging.raw(), 0, byte_len);
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.raw().slice(0..byte_len);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |res| {
        let _ = tx.send(res);
    });
    device.poll(wgpu::Maintain::Wait);
    rx.recv()
        .map_err(|_| DopplerError::Capability("GPU readback channel closed before map completed".to_string()))?
        .map_err(|e| DopplerError::Capability(format!("GPU buffer map failed: {e}")))?;

    let data = bytemuck::cast_slice(&slice.get_mapped_range()).to_vec();
    staging.raw().unmap();

    pool.release(out_buf);
    pool.release(staging);
    Ok(data)
}

fn dequantize_b_operand(b_bytes: &[u8], b_dtype: Dtype, n: usize, k: usize) -> Vec<f32> {
    use crate::kernels::quant::{dequantize_mxfp4, dequantize_q4_k_m};
    match b_dtype {
        Dtype::F32 => bytemuck::cast_slice(b_bytes).to_vec(),
        Dtype::F16 => b_bytes
            .chunks(2)
            .map(|c| half::f16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        Dtype::Q4_K_M => dequantize_q4_k_m(b_bytes, n * k),
        Dtype::MXFP4 => dequantize_mxfp4(b_bytes, n * k),
    }
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct MatmulDims {
    m: u32,
    k: u32,
    n: u32,
    transpose_b: u32,
}

#[allow(clippy::too_many_arguments)]
pub fn matmul(
    handle: &DeviceHandle,
    kernels: &mut PipelineManager,
    pool: &mut BufferPool,
    a: &[f32],
    m: usize,
    k: usize,
    b_bytes: &[u8],
    b_dtype: Dtype,
    n: usize,
    transpose_b: bool,
) -> DopplerResult<Vec<f32>> {
    let device = handle.device.as_ref();
    let queue = handle.queue.as_ref();
    let b = dequantize_b_operand(b_bytes, b_dtype, n, k);

    let a_buf = upload_f32(queue, pool, a, "doppler-matmul-a")?;
    let b_buf = upload_f32(queue, pool, &b, "doppler-matmul-b")?;
    let c_buf = output_buffer(pool, m * n, "doppler-matmul-c")?;
    let dims_buf = uniform(
        queue,
        pool,
        MatmulDims { m: m as u32, k: k as u32, n: n as u32, transpose_b: transpose_b as u32 },
        "doppler-matmul-dims",
    )?;

    let pipeline = kernels.get_or_compile(KernelId::Matmul);
    let entries = [
        wgpu::BindGroupEntry { binding: 0, resource: a_buf.raw().as_entire_binding() },
        wgpu::BindGroupEntry { binding: 1, resource: b_buf.raw().as_entire_binding() },
        wgpu::BindGroupEntry { binding: 2, resource: c_buf.raw().as_entire_binding() },
        wgpu::BindGroupEntry { binding: 3, resource: dims_buf.raw().as_entire_binding() },
    ];
    let workgroups = (n.div_ceil(8) as u32, m.div_ceil(8) as u32, 1);
    dispatch_compute(device, queue, pipeline, &entries, workgroups, "doppler-matmul-dispatch");

    pool.release(a_buf);
    pool.release(b_buf);
    pool.release(dims_buf);
    readback_f32(device, queue, pool, c_buf, m * n)
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct RmsNormDims {
    t: u32,
    h: u32,
    eps: f32,
    weight_offset: u32,
}

pub fn rms_norm(
    handle: &DeviceHandle,
    kernels: &mut PipelineManager,
    pool: &mut BufferPool,
    x: &[f32],
    t: usize,
    h: usize,
    w: &[f32],
    eps: f32,
    weight_offset: bool,
) -> DopplerResult<Vec<f32>> {
    let device = handle.device.as_ref();
    let queue = handle.queue.as_ref();

    let x_buf = upload_f32(queue, pool, x, "doppler-rmsnorm-x")?;
    let w_buf = upload_f32(queue, pool, w, "doppler-rmsnorm-w")?;
    let y_buf = output_buffer(pool, t * h, "doppler-rmsnorm-y")?;
    let dims_buf = uniform(
        queue,
        pool,
        RmsNormDims { t: t as u32, h: h as u32, eps, weight_offset: weight_offset as u32 },
        "doppler-rmsnorm-dims",
    )?;

    let pipeline = kernels.get_or_compile(KernelId::RmsNorm);
    let entries = [
        wgpu::BindGroupEntry { binding: 0, resource: x_buf.raw().as_entire_binding() },
        wgpu::BindGroupEntry { binding: 1, resource: w_buf.raw().as_entire_binding() },
        wgpu::BindGroupEntry { binding: 2, resource: y_buf.raw().as_entire_binding() },
        wgpu::BindGroupEntry { binding: 3, resource: dims_buf.raw().as_entire_binding() },
    ];
    dispatch_compute(device, queue, pipeline, &entries, (t.div_ceil(64) as u32, 1, 1), "doppler-rmsnorm-dispatch");

    pool.release(x_buf);
    pool.release(w_buf);
    pool.release(dims_buf);
    readback_f32(device, queue, pool, y_buf, t * h)
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct AttentionDims {
    qt: u32,
    kt: u32,
    num_heads: u32,
    num_kv_heads: u32,
    head_dim: u32,
    start_pos: u32,
    is_causal: u32,
    sliding_window: u32,
}

#[allow(clippy::too_many_arguments)]
pub fn attention(
    handle: &DeviceHandle,
    kernels: &mut PipelineManager,
    pool: &mut BufferPool,
    q: &[f32],
    qt: usize,
    k: &[f32],
    v: &[f32],
    kt: usize,
    num_heads: usize,
    num_kv_heads: usize,
    head_dim: usize,
    is_causal: bool,
    start_pos: usize,
    sliding_window: Option<usize>,
) -> DopplerResult<Vec<f32>> {
    if head_dim > 256 {
        return Err(DopplerError::Capability(
            "attention kernel's accumulator assumes head_dim <= 256".to_string(),
        ));
    }
    let device = handle.device.as_ref();
    let queue = handle.queue.as_ref();

    let q_buf = upload_f32(queue, pool, q, "doppler-attn-q")?;
    let k_buf = upload_f32(queue, pool, k, "doppler-attn-k")?;
    let v_buf = upload_f32(queue, pool, v, "doppler-attn-v")?;
    let out_buf = output_buffer(pool, qt * num_heads * head_dim, "doppler-attn-out")?;
    let dims_buf = uniform(
        queue,
        pool,
        AttentionDims {
            qt: qt as u32,
            kt: kt as u32,
            num_heads: num_heads as u32,
            num_kv_heads: num_kv_heads as u32,
            head_dim: head_dim as u32,
            start_pos: start_pos as u32,
            is_causal: is_causal as u32,
            sliding_window: sliding_window.unwrap_or(0) as u32,
        },
        "doppler-attn-dims",
    )?;

    let pipeline = kernels.get_or_compile(KernelId::Attention);
    let entries = [
        wgpu::BindGroupEntry { binding: 0, resource: q_buf.raw().as_entire_binding() },
        wgpu::BindGroupEntry { binding: 1, resource: k_buf.raw().as_entire_binding() },
        wgpu::BindGroupEntry { binding: 2, resource: v_buf.raw().as_entire_binding() },
        wgpu::BindGroupEntry { binding: 3, resource: out_buf.raw().as_entire_binding() },
        wgpu::BindGroupEntry { binding: 4, resource: dims_buf.raw().as_entire_binding() },
    ];
    dispatch_compute(device, queue, pipeline, &entries, (qt as u32, num_heads as u32, 1), "doppler-attn-dispatch");

    pool.release(q_buf);
    pool.release(k_buf);
    pool.release(v_buf);
    pool.release(dims_buf);
    readback_f32(device, queue, pool, out_buf, qt * num_heads * head_dim)
}

pub fn residual_add(handle: &DeviceHandle, kernels: &mut PipelineManager, pool: &mut BufferPool, x: &[f32], r: &[f32]) -> DopplerResult<Vec<f32>> {
    #[repr(C)]
    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct Dims {
        count: u32,
    }
    let device = handle.device.as_ref();
    let queue = handle.queue.as_ref();
    let count = x.len();

    let x_buf = upload_f32(queue, pool, x, "doppler-residual-x")?;
    let r_buf = upload_f32(queue, pool, r, "doppler-residual-r")?;
    let out_buf = output_buffer(pool, count, "doppler-residual-out")?;
    let dims_buf = uniform(queue, pool, Dims { count: count as u32 }, "doppler-residual-dims")?;

    let pipeline = kernels.get_or_compile(KernelId::Residual);
    let entries = [
        wgpu::BindGroupEntry { binding: 0, resource: x_buf.raw().as_entire_binding() },
        wgpu::BindGroupEntry { binding: 1, resource: r_buf.raw().as_entire_binding() },
        wgpu::BindGroupEntry { binding: 2, resource: out_buf.raw().as_entire_binding() },
        wgpu::BindGroupEntry { binding: 3, resource: dims_buf.raw().as_entire_binding() },
    ];
    dispatch_compute(device, queue, pipeline, &entries, (count.div_ceil(64) as u32, 1, 1), "doppler-residual-dispatch");

    pool.release(x_buf);
    pool.release(r_buf);
    pool.release(dims_buf);
    readback_f32(device, queue, pool, out_buf, count)
}

pub fn activation_gate(
    handle: &DeviceHandle,
    kernels: &mut PipelineManager,
    pool: &mut BufferPool,
    gate: &[f32],
    up: &[f32],
    activation: crate::arch::Activation,
) -> DopplerResult<Vec<f32>> {
    #[repr(C)]
    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct Dims {
        count: u32,
        kind: u32,
    }
    let device = handle.device.as_ref();
    let queue = handle.queue.as_ref();
    let count = gate.len();
    let kind = match activation {
        crate::arch::Activation::Silu => 0u32,
        crate::arch::Activation::Gelu => 1u32,
    };

    let gate_buf = upload_f32(queue, pool, gate, "doppler-activation-gate")?;
    let up_buf = upload_f32(queue, pool, up, "doppler-activation-up")?;
    let out_buf = output_buffer(pool, count, "doppler-activation-out")?;
    let dims_buf = uniform(queue, pool, Dims { count: count as u32, kind }, "doppler-activation-dims")?;

    let pipeline = kernels.get_or_compile(KernelId::Activation);
    let entries = [
        wgpu::BindGroupEntry { binding: 0, resource: gate_buf.raw().as_entire_binding() },
        wgpu::BindGroupEntry { binding: 1, resource: up_buf.raw().as_entire_binding() },
        wgpu::BindGroupEntry { binding: 2, resource: out_buf.raw().as_entire_binding() },
        wgpu::BindGroupEntry { binding: 3, resource: dims_buf.raw().as_entire_binding() },
    ];
    dispatch_compute(device, queue, pipeline, &entries, (count.div_ceil(64) as u32, 1, 1), "doppler-activation-dispatch");

    pool.release(gate_buf);
    pool.release(up_buf);
    pool.release(dims_buf);
    readback_f32(device, queue, pool, out_buf, count)
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct RopeDims {
    t: u32,
    num_heads: u32,
    head_dim: u32,
    start_pos: u32,
    theta_base: f32,
    scale_factor: f32,
    scaling_kind: u32,
}

#[allow(clippy::too_many_arguments)]
pub fn rope(
    handle: &DeviceHandle,
    kernels: &mut PipelineManager,
    pool: &mut BufferPool,
    x: &[f32],
    t: usize,
    num_heads: usize,
    head_dim: usize,
    start_pos: usize,
    theta_base: f64,
    scaling: crate::kernels::rope::RopeScalingType,
    scale_factor: f64,
) -> DopplerResult<Vec<f32>> {
    let device = handle.device.as_ref();
    let queue = handle.queue.as_ref();
    let scaling_kind = match scaling {
        crate::kernels::rope::RopeScalingType::None => 0u32,
        crate::kernels::rope::RopeScalingType::Linear | crate::kernels::rope::RopeScalingType::Unknown => 1u32,
    };

    let x_buf = upload_f32(queue, pool, x, "doppler-rope-x")?;
    let dims_buf = uniform(
        queue,
        pool,
        RopeDims {
            t: t as u32,
            num_heads: num_heads as u32,
            head_dim: head_dim as u32,
            start_pos: start_pos as u32,
            theta_base: theta_base as f32,
            scale_factor: scale_factor as f32,
            scaling_kind,
        },
        "doppler-rope-dims",
    )?;

    let pipeline = kernels.get_or_compile(KernelId::Rope);
    let entries = [
        wgpu::BindGroupEntry { binding: 0, resource: x_buf.raw().as_entire_binding() },
        wgpu::BindGroupEntry { binding: 1, resource: dims_buf.raw().as_entire_binding() },
    ];
    dispatch_compute(device, queue, pipeline, &entries, (t as u32, num_heads as u32, 1), "doppler-rope-dispatch");

    pool.release(dims_buf);
    readback_f32(device, queue, pool, x_buf, x.len())
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct GatherDims {
    t: u32,
    h: u32,
    vocab_size: u32,
    scale: u32,
}

pub fn gather(
    handle: &DeviceHandle,
    kernels: &mut PipelineManager,
    pool: &mut BufferPool,
    ids: &[u32],
    table: &[f32],
    vocab_size: usize,
    h: usize,
    scale: bool,
) -> DopplerResult<Vec<f32>> {
    let device = handle.device.as_ref();
    let queue = handle.queue.as_ref();
    let t = ids.len();

    let ids_buf = upload_u32(queue, pool, ids, "doppler-gather-ids")?;
    let table_buf = upload_f32(queue, pool, table, "doppler-gather-table")?;
    let out_buf = output_buffer(pool, t * h, "doppler-gather-out")?;
    let dims_buf = uniform(
        queue,
        pool,
        GatherDims { t: t as u32, h: h as u32, vocab_size: vocab_size as u32, scale: scale as u32 },
        "doppler-gather-dims",
    )?;

    let pipeline = kernels.get_or_compile(KernelId::Gather);
    let entries = [
        wgpu::BindGroupEntry { binding: 0, resource: ids_buf.raw().as_entire_binding() },
        wgpu::BindGroupEntry { binding: 1, resource: table_buf.raw().as_entire_binding() },
        wgpu::BindGroupEntry { binding: 2, resource: out_buf.raw().as_entire_binding() },
        wgpu::BindGroupEntry { binding: 3, resource: dims_buf.raw().as_entire_binding() },
    ];
    dispatch_compute(device, queue, pipeline, &entries, (t.div_ceil(64) as u32, 1, 1), "doppler-gather-dispatch");

    pool.release(ids_buf);
    pool.release(table_buf);
    pool.release(dims_buf);
    readback_f32(device, queue, pool, out_buf, t * h)
}

pub fn softmax(handle: &DeviceHandle, kernels: &mut PipelineManager, pool: &mut BufferPool, x: &[f32], t: usize, h: usize) -> DopplerResult<Vec<f32>> {
    #[repr(C)]
    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct Dims {
        t: u32,
        h: u32,
    }
    let device = handle.device.as_ref();
    let queue = handle.queue.as_ref();

    let x_buf = upload_f32(queue, pool, x, "doppler-softmax-x")?;
    let out_buf = output_buffer(pool, t * h, "doppler-softmax-out")?;
    let dims_buf = uniform(queue, pool, Dims { t: t as u32, h: h as u32 }, "doppler-softmax-dims")?;

    let pipeline = kernels.get_or_compile(KernelId::Softmax);
    let entries = [
        wgpu::BindGroupEntry { binding: 0, resource: x_buf.raw().as_entire_binding() },
        wgpu::BindGroupEntry { binding: 1, resource: out_buf.raw().as_entire_binding() },
        wgpu::BindGroupEntry { binding: 2, resource: dims_buf.raw().as_entire_binding() },
    ];
    dispatch_compute(device, queue, pipeline, &entries, (t.div_ceil(64) as u32, 1, 1), "doppler-softmax-dispatch");

    pool.release(x_buf);
    pool.release(dims_buf);
    readback_f32(device, queue, pool, out_buf, t * h)
}

/// F16-only GPU dequantization; Q4_K_M/MXFP4 stay a CPU pre-pass (their
/// variable sub-block widths don't fit this kernel's flat layout; see
/// `kernels::shaders::quant` for the packed-code contract this matches).
pub fn dequantize_f16(handle: &DeviceHandle, kernels: &mut PipelineManager, pool: &mut BufferPool, packed: &[u8], count: usize) -> DopplerResult<Vec<f32>> {
    #[repr(C)]
    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct Dims {
        count: u32,
    }
    let device = handle.device.as_ref();
    let queue = handle.queue.as_ref();

    let words: Vec<u32> = packed
        .chunks(4)
        .map(|c| {
            let mut buf = [0u8; 4];
            buf[..c.len()].copy_from_slice(c);
            u32::from_le_bytes(buf)
        })
        .collect();
    let packed_buf = upload_u32(queue, pool, &words, "doppler-quant-packed")?;
    let out_buf = output_buffer(pool, count, "doppler-quant-out")?;
    let dims_buf = uniform(queue, pool, Dims { count: count as u32 }, "doppler-quant-dims")?;

    let pipeline = kernels.get_or_compile(KernelId::Quant);
    let entries = [
        wgpu::BindGroupEntry { binding: 0, resource: packed_buf.raw().as_entire_binding() },
        wgpu::BindGroupEntry { binding: 1, resource: out_buf.raw().as_entire_binding() },
        wgpu::BindGroupEntry { binding: 2, resource: dims_buf.raw().as_entire_binding() },
    ];
    dispatch_compute(device, queue, pipeline, &entries, (count.div_ceil(64) as u32, 1, 1), "doppler-quant-dispatch");

    pool.release(packed_buf);
    pool.release(dims_buf);
    readback_f32(device, queue, pool, out_buf, count)
}

fn dispatch_compute(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    pipeline: &wgpu::ComputePipeline,
    entries: &[wgpu::BindGroupEntry],
    workgroups: (u32, u32, u32),
    label: &str,
) {
    let layout = pipeline.get_bind_group_layout(0);
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout: &layout,
        entries,
    });
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(workgroups.0, workgroups.1, workgroups.2);
    }
    queue.submit(std::iter::once(encoder.finish()));
}

#[cfg(test)]
mod tests {
    // `forward`'s dispatch wrappers require a live `wgpu::Device`, which is
    // unavailable in headless CI; their numeric contract is the matching
    // `kernels::*::cpu_ref` function, exercised by `kernels`' own test
    // modules and by `layer::tests` against the CPU reference path.
}
