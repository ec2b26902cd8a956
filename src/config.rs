//! Runtime configuration for the ghostmem engine.
//!
//! Library users fill a [`GhostConfig`] by hand. The demo binary can also
//! load settings from `ghostmem.toml` (or `$GHOSTMEM_CONFIG`); CLI flags
//! override file values.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::GhostError;
use crate::vm::DEFAULT_MAX_RESIDENT_PAGES;

/// Engine configuration. Every field has a working default; an in-memory
/// store with a five-page resident budget needs no setup at all.
#[derive(Debug, Clone)]
pub struct GhostConfig {
    /// Freeze cold pages into the swap file instead of the in-memory store.
    pub use_disk_backing: bool,
    /// Swap file location; created (and truncated) at init.
    pub disk_file_path: PathBuf,
    /// Upper bound on simultaneously committed pages. Zero selects the
    /// built-in default.
    pub max_resident_pages: usize,
    /// Run LZ4 over a page before it goes to disk.
    pub compress_before_disk: bool,
    /// ChaCha20-encrypt disk-bound pages. Has no effect without disk backing.
    pub encrypt_disk_pages: bool,
    /// Emit per-fault and per-freeze log messages.
    pub verbose_logging: bool,
}

impl Default for GhostConfig {
    fn default() -> Self {
        Self {
            use_disk_backing: false,
            disk_file_path: PathBuf::from("ghost.swap"),
            max_resident_pages: DEFAULT_MAX_RESIDENT_PAGES,
            compress_before_disk: true,
            encrypt_disk_pages: false,
            verbose_logging: false,
        }
    }
}

impl GhostConfig {
    /// Resident budget with the zero-means-default rule applied.
    pub fn effective_max_resident(&self) -> usize {
        if self.max_resident_pages == 0 {
            DEFAULT_MAX_RESIDENT_PAGES
        } else {
            self.max_resident_pages
        }
    }

    /// Load from `$GHOSTMEM_CONFIG` or `./ghostmem.toml`, falling back to
    /// defaults when neither exists.
    pub fn load() -> Result<Self, GhostError> {
        let path = match std::env::var("GHOSTMEM_CONFIG") {
            Ok(path) => PathBuf::from(path),
            Err(_) => PathBuf::from("ghostmem.toml"),
        };

        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load and parse a config file.
    pub fn load_from_file(path: &Path) -> Result<Self, GhostError> {
        let content = fs::read_to_string(path)
            .map_err(|e| GhostError::Config(format!("cannot read {}: {e}", path.display())))?;
        Ok(Self::from_toml_str(&content))
    }

    /// Parse `[engine]` key/value pairs. Keys outside the `[engine]` section
    /// and unknown or malformed values are ignored.
    pub fn from_toml_str(content: &str) -> Self {
        let mut config = Self::default();
        let mut in_engine = false;

        for raw in content.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                in_engine = header.trim() == "engine";
                continue;
            }
            if !in_engine {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                config.apply_key(key.trim(), unquote(value.trim()));
            }
        }
        config
    }

    fn apply_key(&mut self, key: &str, value: &str) {
        match key {
            "use_disk_backing" => self.use_disk_backing = value == "true",
            "disk_file_path" => self.disk_file_path = PathBuf::from(value),
            "max_resident_pages" => {
                if let Ok(pages) = value.parse() {
                    self.max_resident_pages = pages;
                }
            }
            "compress_before_disk" => self.compress_before_disk = value == "true",
            "encrypt_disk_pages" => self.encrypt_disk_pages = value == "true",
            "verbose_logging" => self.verbose_logging = value == "true",
            _ => {}
        }
    }

    /// Generate a default config file.
    pub fn default_toml() -> String {
        r#"# ghostmem configuration file

[engine]
use_disk_backing = false
disk_file_path = "ghost.swap"
max_resident_pages = 5
compress_before_disk = true
encrypt_disk_pages = false
verbose_logging = false
"#
        .to_string()
    }
}

/// Peel one pair of surrounding double quotes, if present.
fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 && bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"' {
        &value[1..value.len() - 1]
    } else {
        value
    }
}
