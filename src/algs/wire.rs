//! Byte views of staged halo payloads.
//!
//! Staging buffers hold `f64` values in native byte order; peers are assumed
//! to share the same float representation.

pub fn cast_slice(v: &[f64]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut(v: &mut [f64]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} bytes, got {actual}"))
    }
}

/// Copy a received byte payload into `dst`, which must match it exactly.
pub fn copy_from_bytes(dst: &mut [f64], src: &[u8]) -> Result<(), String> {
    let bytes = cast_slice_mut(dst);
    expect_exact_len(src.len(), bytes.len())?;
    bytes.copy_from_slice(src);
    Ok(())
}
