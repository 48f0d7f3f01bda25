use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::bitmap;

const CONFIG_FILE_NAME: &str = "memu-config.json";

pub const DEFAULT_MEMUC_PATH: &str = "C:/Program Files/Microvirt/MEmu/memuc.exe";
pub const DEFAULT_MAX_INSTANCES: usize = 50;

const ENV_MEMUC_PATH: &str = "MEMU_MEMUC_PATH";
const ENV_MAX_INSTANCES: &str = "MEMU_MAX_INSTANCES";
const ENV_NORMALIZE_CRLF: &str = "MEMU_NORMALIZE_CRLF";

/// Display settings pushed to an instance before it boots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    pub width: u32,
    pub height: u32,
    pub dpi: u16,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            width: 720,
            height: 1280,
            dpi: 240,
        }
    }
}

impl VmConfig {
    /// Largest bitmap a capture can produce at this resolution, in either
    /// orientation. Zero when no BMP of that size can be written, so every
    /// capture reports an overflow instead of allocating.
    pub fn max_image_bytes(&self) -> usize {
        let portrait = bitmap::encoded_len(self.width, self.height);
        let landscape = bitmap::encoded_len(self.height, self.width);
        portrait
            .zip(landscape)
            .map(|(portrait, landscape)| portrait.max(landscape))
            .filter(|&len| len <= u64::from(u32::MAX))
            .map_or(0, |len| len as usize)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemucConfig {
    /// Full path to `memuc.exe`.
    pub memuc_path: PathBuf,
    /// Number of addressable instance slots.
    pub max_instances: usize,
    /// Collapse `CR LF` to `LF` in capture output before decoding.
    pub normalize_crlf: bool,
    pub vm: VmConfig,
}

impl Default for MemucConfig {
    fn default() -> Self {
        Self {
            memuc_path: PathBuf::from(DEFAULT_MEMUC_PATH),
            max_instances: DEFAULT_MAX_INSTANCES,
            normalize_crlf: false,
            vm: VmConfig::default(),
        }
    }
}

impl MemucConfig {
    /// Loads the config file from the state dir, then applies env overrides.
    /// A missing or unreadable file falls back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        let mut cfg = match fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str::<MemucConfig>(&data) {
                Ok(file_cfg) => file_cfg,
                Err(err) => {
                    warn!("Failed to parse {}: {}", path.display(), err);
                    MemucConfig::default()
                }
            },
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {}", path.display(), err);
                }
                MemucConfig::default()
            }
        };
        cfg.apply_env();
        cfg
    }

    pub fn save(&self) -> io::Result<()> {
        self.save_to(&config_path())
    }

    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        memu_util::write_json_atomic(path, self)
    }

    fn apply_env(&mut self) {
        if let Ok(path) = std::env::var(ENV_MEMUC_PATH) {
            if !path.trim().is_empty() {
                self.memuc_path = memu_util::expand_user(path.trim());
            }
        }
        if let Ok(value) = std::env::var(ENV_MAX_INSTANCES) {
            match value.trim().parse::<usize>() {
                Ok(max) if max > 0 => self.max_instances = max,
                _ => warn!("Ignoring invalid {ENV_MAX_INSTANCES}={value:?}"),
            }
        }
        if let Some(flag) = memu_util::env_flag(ENV_NORMALIZE_CRLF) {
            self.normalize_crlf = flag;
        }
    }
}

pub fn config_path() -> PathBuf {
    memu_util::state_file_path(CONFIG_FILE_NAME)
}
