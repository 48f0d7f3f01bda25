//! Controller for MEmu Android instances, driven through the `memuc` CLI.
//!
//! [`Memuc`] issues commands and interprets what comes back: status
//! preambles ([`response`]), comma- and line-oriented listings
//! ([`listing`]), and raw `screencap` framebuffers ([`framebuffer`]) that
//! are re-encoded as 24-bit BMP images ([`bitmap`]) into per-instance
//! buffers ([`pool`]).

pub mod bitmap;
pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod framebuffer;
pub mod launcher;
pub mod listing;
pub mod pool;
pub mod response;

pub use client::Memuc;
pub use command::KeyCode;
pub use config::{MemucConfig, VmConfig};
pub use error::{Error, LaunchFailure, Result};
pub use launcher::{Launcher, SystemLauncher};
pub use listing::{InstanceRecord, ProcessRecord};
pub use pool::{BufferPool, SlotView};
