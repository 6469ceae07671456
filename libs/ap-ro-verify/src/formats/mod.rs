//! Decoders for the structures found in AP flash.
//!
//! The layouts are fixed by the tools that produce AP firmware images and are
//! reproduced byte for byte. Everything here operates on controller-owned
//! copies; no decoder hands out an offset that has not been checked against
//! the buffer it points into.
use core::ops::Range;

use bytemuck::Pod;

use crate::error::FormatError;

pub mod fmap;
pub mod gvd;
pub mod vb2;

/// Copies a `T` out of `raw` at `at`.
pub fn read_pod<T: Pod>(raw: &[u8], at: usize) -> Result<T, FormatError> {
    let end = at.checked_add(core::mem::size_of::<T>()).ok_or(FormatError::ShortBuffer)?;
    let bytes = raw.get(at..end).ok_or(FormatError::ShortBuffer)?;
    Ok(bytemuck::pod_read_unaligned(bytes))
}

/// Locates the body of a sub-structure inside a container of `total` bytes.
///
/// The sub-structure header sits at `element` bytes from the container start
/// and describes its body as `data_size` bytes located `data_offset` bytes past
/// the header. The returned range is guaranteed to lie within the container.
pub fn element_fits(total: usize, element: usize, data_offset: u32, data_size: u32) -> Result<Range<usize>, FormatError> {
    if element == 0 || element >= total {
        return Err(FormatError::ElementDoesNotFit);
    }
    let headroom = total - element;
    let data_offset = data_offset as usize;
    let data_size = data_size as usize;
    if data_offset >= headroom || data_size > headroom - data_offset {
        return Err(FormatError::ElementDoesNotFit);
    }
    let start = element + data_offset;
    Ok(start..start + data_size)
}

pub(crate) fn le_u16(raw: &[u8], at: usize) -> u16 { u16::from_le_bytes([raw[at], raw[at + 1]]) }

pub(crate) fn le_u32(raw: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]])
}

pub(crate) fn le_u64(raw: &[u8], at: usize) -> u64 {
    (le_u32(raw, at) as u64) | ((le_u32(raw, at + 4) as u64) << 32)
}
