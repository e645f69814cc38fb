//! Filesystem layout detection.
//!
//! An installed system is recognised by the presence of `/usr/lib/hellou`;
//! anything else is treated as a development checkout rooted at the current
//! directory.

use std::env;
use std::path::{Path, PathBuf};

/// Marker directory whose existence selects the installed layout.
pub const INSTALL_MARKER: &str = "/usr/lib/hellou";

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "HELLOU_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Installed,
    Development,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub layout: Layout,
    /// Base for resolving relative paths found in the config file.
    pub root: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub modules_dir: PathBuf,
    pub log_file: PathBuf,
}

impl Paths {
    #[must_use]
    pub fn detect() -> Self {
        if Path::new(INSTALL_MARKER).is_dir() {
            Self::installed()
        } else {
            let root = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            Self::development(root)
        }
    }

    #[must_use]
    pub fn installed() -> Self {
        Self {
            layout: Layout::Installed,
            root: PathBuf::from("/"),
            config_file: PathBuf::from("/etc/hellou/config.toml"),
            data_dir: PathBuf::from("/var/lib/hellou"),
            modules_dir: PathBuf::from(INSTALL_MARKER),
            log_file: PathBuf::from("/var/log/hellou.log"),
        }
    }

    #[must_use]
    pub fn development(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            layout: Layout::Development,
            config_file: root.join("config").join("config.toml"),
            data_dir: root.join("data"),
            modules_dir: root.join("helper"),
            log_file: root.join("hellou.log"),
            root,
        }
    }

    #[must_use]
    pub fn users_dir(&self) -> PathBuf {
        self.data_dir.join("users")
    }

    #[must_use]
    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir.join("pam-backups")
    }

    /// Lock file that serializes capture-device access across processes.
    #[must_use]
    pub fn device_lock(&self) -> PathBuf {
        self.data_dir.join("camera.lock")
    }

    #[must_use]
    pub fn audit_log(&self) -> PathBuf {
        self.data_dir.join("audit.jsonl")
    }

    #[must_use]
    pub fn helper(&self) -> PathBuf {
        self.modules_dir.join("hellou-helper")
    }

    /// Candidate config files, most specific first.
    #[must_use]
    pub fn config_candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(explicit) = env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            candidates.push(PathBuf::from(explicit));
        }
        candidates.push(self.config_file.clone());
        if self.layout == Layout::Development
            && let Some(dir) = dirs::config_dir()
        {
            candidates.push(dir.join("hellou").join("config.toml"));
        }
        candidates
    }

    /// First candidate that exists, or the layout default if none does.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        let candidates = self.config_candidates();
        candidates
            .iter()
            .find(|p| p.is_file())
            .or_else(|| candidates.first())
            .cloned()
            .unwrap_or_else(|| self.config_file.clone())
    }

    /// Strip stray quotes and anchor relative paths at [`Paths::root`].
    #[must_use]
    pub fn resolve(&self, raw: &str) -> PathBuf {
        let clean = raw.trim().trim_matches(|c| c == '"' || c == '\'');
        let path = Path::new(clean);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}
