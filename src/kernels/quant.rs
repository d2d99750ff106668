//! Q4_K_M and MXFP4 dequantization (spec §3 "Quantization blocks", §6.4,
//! §4.7). CPU reference implementations the GPU kernels are defined to
//! match (spec §8: kernel-level numeric tests run against these when no
//! physical device is available).

pub const Q4_K_M_BLOCK_ELEMENTS: usize = 256;
pub const Q4_K_M_BLOCK_BYTES: usize = 144;
pub const Q4_K_M_SUB_BLOCKS: usize = 8;
pub const Q4_K_M_SUB_BLOCK_ELEMENTS: usize = 32;

pub const MXFP4_BLOCK_ELEMENTS: usize = 32;
pub const MXFP4_BLOCK_BYTES: usize = 17;

/// Unpack the 8 6-bit scale codes and 8 6-bit min codes from the 12-byte
/// packed region of one Q4_K_M super-block. Layout follows the canonical
/// ggml k-quant packing: the low 6 bits of the first 8 bytes hold the
/// scales, the low 6 bits of the next 4 bytes plus the high 2 bits of the
/// first 8 bytes hold the mins.
fn unpack_scale_min_codes(packed: &[u8; 12]) -> ([u8; 8], [u8; 8]) {
    let mut scales = [0u8; 8];
    let mut mins = [0u8; 8];
    for j in 0..4 {
        scales[j] = packed[j] & 0x3F;
        scales[j + 4] = packed[j + 4] & 0x3F;
        mins[j] = packed[j + 8] & 0x3F;
        mins[j + 4] = (packed[j] >> 6) | ((packed[j + 4] >> 6) << 2);
    }
    (scales, mins)
}

/// Dequantize one 144-byte Q4_K_M super-block into 256 f32 elements.
pub fn dequantize_q4_k_m_block(block: &[u8; Q4_K_M_BLOCK_BYTES]) -> [f32; Q4_K_M_BLOCK_ELEMENTS] {
    let d = half::f16::from_le_bytes([block[0], block[1]]).to_f32();
    let dmin = half::f16::from_le_bytes([block[2], block[3]]).to_f32();

    let mut packed = [0u8; 12];
    packed.copy_from_slice(&block[4..16]);
    let (scale_codes, min_codes) = unpack_scale_min_codes(&packed);

    let weights = &block[16..144];
    let mut out = [0f32; Q4_K_M_BLOCK_ELEMENTS];

    for sub in 0..Q4_K_M_SUB_BLOCKS {
        let scale = d * scale_codes[sub] as f32;
        let min = dmin * min_codes[sub] as f32;
        let nibble_base = sub * 16; // 32 4-bit values = 16 bytes per sub-block
        for i in 0..Q4_K_M_SUB_BLOCK_ELEMENTS {
            let byte = weights[nibble_base + i / 2];
            let q = if i % 2 == 0 { byte & 0x0F } else { byte >> 4 };
            out[sub * Q4_K_M_SUB_BLOCK_ELEMENTS + i] = q as f32 * scale + min;
        }
    }

    out
}

/// Dequantize a full Q4_K_M tensor (may span multiple 144-byte blocks; the
/// final block may be logically shorter than 256 elements).
pub fn dequantize_q4_k_m(bytes: &[u8], element_count: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(element_count);
    for chunk in bytes.chunks(Q4_K_M_BLOCK_BYTES) {
        if chunk.len() < Q4_K_M_BLOCK_BYTES {
            break;
        }
        let mut block = [0u8; Q4_K_M_BLOCK_BYTES];
        block.copy_from_slice(chunk);
        let dequantized = dequantize_q4_k_m_block(&block);
        let remaining = element_count - out.len();
        let take = remaining.min(Q4_K_M_BLOCK_ELEMENTS);
        out.extend_from_slice(&dequantized[..take]);
    }
    out
}

/// MXFP4: 32-element block, 1 shared U8 exponent-scale byte + 16 bytes of
/// packed 4-bit mantissas (spec §3, §9 open question: bit-exact layout is
/// inferred from structure, not fully documented upstream).
pub fn dequantize_mxfp4_block(block: &[u8; MXFP4_BLOCK_BYTES]) -> [f32; MXFP4_BLOCK_ELEMENTS] {
    let exponent = block[0] as i32 - 127;
    let scale = 2f32.powi(exponent);
    let mantissas = &block[1..17];

    let mut out = [0f32; MXFP4_BLOCK_ELEMENTS];
    for i in 0..MXFP4_BLOCK_ELEMENTS {
        let byte = mantissas[i / 2];
        let nibble = if i % 2 == 0 { byte & 0x0F } else { byte >> 4 };
        // Sign-magnitude 4-bit mantissa: top bit is sign, low 3 bits are
        // a linear fractional magnitude in [0, 7]/8.
        let sign = if nibble & 0x08 != 0 { -1.0 } else { 1.0 };
        let magnitude = (nibble & 0x07) as f32 / 8.0;
        out[i] = sign * magnitude * scale;
    }
    out
}

pub fn dequantize_mxfp4(bytes: &[u8], element_count: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(element_count);
    for chunk in bytes.chunks(MXFP4_BLOCK_BYTES) {
        if chunk.len() < MXFP4_BLOCK_BYTES {
            break;
        }
        let mut block = [0u8; MXFP4_BLOCK_BYTES];
        block.copy_from_slice(chunk);
        let dequantized = dequantize_mxfp4_block(&block);
        let remaining = element_count - out.len();
        let take = remaining.min(MXFP4_BLOCK_ELEMENTS);
        out.extend_from_slice(&dequantized[..take]);
    }
    out
}
