//! Raw `screencap` framebuffer dumps.
//!
//! Without `-p`, `screencap` writes a 12-byte little-endian header
//! (width, height, pixel format) followed by `width * height` packed
//! 4-byte pixels in RGBA order, top row first.

use crate::error::{Error, Result};

pub const HEADER_LEN: usize = 12;
pub const BYTES_PER_PIXEL: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub width: u32,
    pub height: u32,
    /// Android `PixelFormat` value. Recorded but not interpreted.
    pub pixel_format: u32,
    pub pixel_data_offset: usize,
}

impl FrameHeader {
    /// Number of pixel bytes the header promises, or `None` if that does
    /// not fit in a `u64`.
    pub fn pixel_len(&self) -> Option<u64> {
        u64::from(self.width)
            .checked_mul(u64::from(self.height))?
            .checked_mul(BYTES_PER_PIXEL as u64)
    }
}

/// A decoded frame borrowing its pixels from the captured output.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    pub header: FrameHeader,
    pub pixels: &'a [u8],
}

/// Reads the header and checks that the payload holds every pixel it claims.
pub fn decode_header(payload: &[u8]) -> Result<FrameHeader> {
    decode_bounds(payload).map(|(header, _)| header)
}

/// Decodes the header and slices out exactly the pixel bytes it describes.
/// Trailing bytes after the last pixel are ignored.
pub fn decode(payload: &[u8]) -> Result<RawFrame<'_>> {
    let (header, end) = decode_bounds(payload)?;
    Ok(RawFrame {
        header,
        pixels: &payload[header.pixel_data_offset..end],
    })
}

/// Returns the header and the offset one past its last pixel byte.
fn decode_bounds(payload: &[u8]) -> Result<(FrameHeader, usize)> {
    if payload.len() < HEADER_LEN {
        return Err(Error::TruncatedPayload {
            needed: HEADER_LEN as u64,
            actual: payload.len(),
        });
    }

    let header = FrameHeader {
        width: read_u32_le(payload, 0),
        height: read_u32_le(payload, 4),
        pixel_format: read_u32_le(payload, 8),
        pixel_data_offset: HEADER_LEN,
    };

    // Dimensions too large to multiply out can never be backed by the payload.
    let needed = header
        .pixel_len()
        .and_then(|len| len.checked_add(HEADER_LEN as u64))
        .unwrap_or(u64::MAX);
    if needed > payload.len() as u64 {
        return Err(Error::TruncatedPayload {
            needed,
            actual: payload.len(),
        });
    }

    Ok((header, needed as usize))
}

/// Collapses every `CR LF` pair into a single `LF`, in place.
///
/// Some transports translate line endings on binary streams; undoing that has
/// to happen before any offset arithmetic. A lone `CR` is kept.
pub fn normalize_line_endings(data: &mut Vec<u8>) {
    let mut write = 0;
    let mut read = 0;
    let len = data.len();

    while read < len {
        if data[read] == b'\r' && read + 1 < len && data[read + 1] == b'\n' {
            read += 1;
        }
        data[write] = data[read];
        write += 1;
        read += 1;
    }
    data.truncate(write);
}

fn read_u32_le(bytes: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(word)
}
