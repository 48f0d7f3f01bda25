//! 24-bit uncompressed BMP encoding.
//!
//! The output is a `BITMAPFILEHEADER` + `BITMAPINFOHEADER` pair followed by
//! pixel rows stored bottom-up, three bytes per pixel in B, G, R order, each
//! row zero-padded to a multiple of four bytes.

use crate::error::{Error, Result};
use crate::framebuffer::{RawFrame, BYTES_PER_PIXEL};

pub const FILE_HEADER_LEN: usize = 14;
pub const INFO_HEADER_LEN: usize = 40;
pub const HEADERS_LEN: usize = FILE_HEADER_LEN + INFO_HEADER_LEN;

const BITS_PER_PIXEL: u16 = 24;
const BYTES_PER_BMP_PIXEL: usize = 3;
const ROW_ALIGNMENT: u64 = 4;
const BI_RGB: u32 = 0;

/// Padded length of one BMP row for `width` pixels. Cannot overflow: a
/// `u32` width times three stays far below `u64::MAX`.
pub fn aligned_row_size(width: u32) -> u64 {
    let row = u64::from(width) * BYTES_PER_BMP_PIXEL as u64;
    (row + ROW_ALIGNMENT - 1) & !(ROW_ALIGNMENT - 1)
}

/// Total encoded size of a `width` x `height` image, headers included.
/// `None` when the size does not fit in a `u64`.
pub fn encoded_len(width: u32, height: u32) -> Option<u64> {
    aligned_row_size(width)
        .checked_mul(u64::from(height))?
        .checked_add(HEADERS_LEN as u64)
}

/// Encodes a captured frame into `dest`. See [`encode`].
pub fn encode_frame(frame: &RawFrame<'_>, dest: &mut [u8]) -> Result<usize> {
    encode(frame.header.width, frame.header.height, frame.pixels, dest)
}

/// Writes a BMP for top-down RGBA `pixels` into `dest` and returns the number
/// of bytes written.
///
/// Nothing is written unless the whole image fits: an undersized `dest`
/// yields [`Error::BufferOverflow`] and keeps its previous contents.
pub fn encode(width: u32, height: u32, pixels: &[u8], dest: &mut [u8]) -> Result<usize> {
    let total = encoded_len(width, height).unwrap_or(u64::MAX);
    if total > u64::from(u32::MAX) || total > dest.len() as u64 {
        return Err(Error::BufferOverflow {
            needed: total,
            capacity: dest.len(),
        });
    }

    let src_row = width as usize * BYTES_PER_PIXEL;
    let needed_pixels = u64::from(width) * u64::from(height) * BYTES_PER_PIXEL as u64;
    if (pixels.len() as u64) < needed_pixels {
        return Err(Error::TruncatedPayload {
            needed: needed_pixels,
            actual: pixels.len(),
        });
    }

    let total = total as usize;
    let dst_row = aligned_row_size(width) as usize;
    let (header, body) = dest[..total].split_at_mut(HEADERS_LEN);
    write_headers(header, width, height, total as u32);

    if dst_row == 0 {
        return Ok(total);
    }

    let packed = width as usize * BYTES_PER_BMP_PIXEL;
    // Row 0 of the capture is the top of the screen; BMP stores the bottom row first.
    for (dst, src) in body
        .chunks_exact_mut(dst_row)
        .zip(pixels[..src_row * height as usize].chunks_exact(src_row).rev())
    {
        let (data, padding) = dst.split_at_mut(packed);
        for (out, px) in data.chunks_exact_mut(3).zip(src.chunks_exact(4)) {
            out[0] = px[2];
            out[1] = px[1];
            out[2] = px[0];
        }
        padding.fill(0);
    }

    Ok(total)
}

fn write_headers(header: &mut [u8], width: u32, height: u32, file_size: u32) {
    let image_size = file_size - HEADERS_LEN as u32;

    // BITMAPFILEHEADER
    header[0..2].copy_from_slice(b"BM");
    header[2..6].copy_from_slice(&file_size.to_le_bytes());
    header[6..10].fill(0);
    header[10..14].copy_from_slice(&(HEADERS_LEN as u32).to_le_bytes());

    // BITMAPINFOHEADER
    header[14..18].copy_from_slice(&(INFO_HEADER_LEN as u32).to_le_bytes());
    header[18..22].copy_from_slice(&width.to_le_bytes());
    header[22..26].copy_from_slice(&height.to_le_bytes());
    header[26..28].copy_from_slice(&1u16.to_le_bytes());
    header[28..30].copy_from_slice(&BITS_PER_PIXEL.to_le_bytes());
    header[30..34].copy_from_slice(&BI_RGB.to_le_bytes());
    header[34..38].copy_from_slice(&image_size.to_le_bytes());
    header[38..54].fill(0);
}
