//! Splits raw memuc output into a status preamble and a payload.
//!
//! memuc prints a short human-readable status line ahead of whatever the
//! underlying command produced, with no length prefix in between. The first
//! [`PREAMBLE_LEN`] bytes are treated as status text; the rest is passed on
//! untouched.

use crate::error::{Error, Result};

/// Fixed size of the status preamble in bytes.
pub const PREAMBLE_LEN: usize = 40;

/// Substring that marks a successful response for a given operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    /// VM management commands (`start`, `stop`, `startapp`, `setconfigex`, ...).
    Success,
    /// Commands tunnelled through adb, which print the adb connect status first.
    Connected,
}

impl Sentinel {
    pub fn as_str(self) -> &'static str {
        match self {
            Sentinel::Success => "SUCCESS",
            Sentinel::Connected => "connected",
        }
    }
}

#[derive(Debug)]
pub struct Response<'a> {
    pub status_text: String,
    pub payload: &'a [u8],
}

/// Converts host code-page output to UTF-8.
///
/// memuc writes ASCII status lines and ASCII listings; anything outside that
/// is replaced rather than rejected.
pub fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Splits `raw` at [`PREAMBLE_LEN`] and checks the preamble for `sentinel`.
///
/// Output shorter than the preamble yields an empty payload.
pub fn frame(raw: &[u8], sentinel: Sentinel) -> Result<Response<'_>> {
    let split = raw.len().min(PREAMBLE_LEN);
    let (preamble, payload) = raw.split_at(split);
    let status_text = decode_text(preamble);

    if !status_text.contains(sentinel.as_str()) {
        return Err(Error::DeviceNotConnected {
            sentinel: sentinel.as_str(),
            status: status_text.trim().to_string(),
        });
    }

    Ok(Response {
        status_text,
        payload,
    })
}
