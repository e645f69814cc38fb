//! Configuration loading, validation, and persistence for hellou.
//!
//! The raw TOML structs (all `Option` fields) stay private to this crate. They
//! are resolved into [`Settings`] at the parse boundary, so every consumer gets
//! validated values with the defaults already applied.
//!
//! ```toml
//! [camera]
//! device_path = "/dev/video0"
//! width = 640
//! height = 480
//! lock_path = "/var/lib/hellou/camera.lock"
//!
//! [recognition]
//! tolerance = 0.6
//! user_data_path = "/var/lib/hellou/users"
//! helper = "/usr/lib/hellou/hellou-helper"
//!
//! [auth]
//! timeout_secs = 5
//! max_attempts = 3
//! device_policy = "queue"
//! disclose_ignore = false
//! fallback_to_password = true
//!
//! [pam]
//! directive = "auth sufficient pam_exec.so quiet /usr/bin/hellou auth"
//! services = ["sudo", "login"]
//! entry_point = "auth"
//! ```
//!
//! `hellou auth` runs with the privileges of the PAM stack, so it only loads
//! configuration through [`Settings::load_trusted`]: installed layout, no
//! working-directory candidates, and a file nobody but root (or the running
//! user) can modify.
//!
//! `pam_exec` turns every non-zero exit status into `PAM_SYSTEM_ERR`, so under
//! the default directive `auth.disclose_ignore` only changes what the binary
//! prints. The `PAM_IGNORE` exit status reaches hosts that read it directly.

mod paths;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use hellou_types::{DevicePolicy, DirectiveLine, ServiceName, Tolerance};
use hellou_utils::{AtomicWriteOptions, PersistMode, atomic_write_with_options};

pub use paths::{CONFIG_ENV, INSTALL_MARKER, Layout, Paths};

pub const DEFAULT_DEVICE_PATH: &str = "/dev/video0";
pub const DEFAULT_CAMERA_WIDTH: u32 = 640;
pub const DEFAULT_CAMERA_HEIGHT: u32 = 480;
/// Euclidean threshold commonly used with 128-d face descriptors.
pub const DEFAULT_TOLERANCE: f64 = 0.6;
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_ENROLL_SAMPLES: u32 = 5;
pub const DEFAULT_ENROLL_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_DIRECTIVE: &str = "auth sufficient pam_exec.so quiet /usr/bin/hellou auth";
pub const DEFAULT_SERVICES: &[&str] = &["sudo", "su", "login", "gdm-password", "polkit-1"];
pub const DEFAULT_CHAIN_DIR: &str = "/etc/pam.d";
pub const DEFAULT_ENTRY_POINT: &str = "auth";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("unknown config key {0:?} (expected <section>.<key>)")]
    UnknownKey(String),
    #[error("failed to edit config at {}: {source}", path.display())]
    Edit {
        path: PathBuf,
        source: toml_edit::TomlError,
    },
    #[error("failed to write config at {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("refusing untrusted config at {}: {reason}", path.display())]
    Untrusted { path: PathBuf, reason: String },
}

impl ConfigError {
    fn invalid(key: &'static str, reason: impl ToString) -> Self {
        Self::Invalid {
            key,
            reason: reason.to_string(),
        }
    }
}

// ============================================================================
// Raw TOML
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    camera: Option<RawCamera>,
    recognition: Option<RawRecognition>,
    auth: Option<RawAuth>,
    enroll: Option<RawEnroll>,
    pam: Option<RawPam>,
    system: Option<RawSystem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCamera {
    device_path: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    lock_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRecognition {
    tolerance: Option<f64>,
    user_data_path: Option<String>,
    helper: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAuth {
    timeout_secs: Option<u64>,
    max_attempts: Option<u32>,
    #[serde(default)]
    device_policy: DevicePolicy,
    #[serde(default)]
    disclose_ignore: bool,
    #[serde(default = "default_true")]
    fallback_to_password: bool,
    audit_log: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEnroll {
    samples: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPam {
    directive: Option<String>,
    services: Option<Vec<String>>,
    chain_dir: Option<String>,
    backup_dir: Option<String>,
    entry_point: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSystem {
    log_path: Option<String>,
}

// Default value function for serde (bool::default() is false, so only true needs a fn)
const fn default_true() -> bool {
    true
}

// ============================================================================
// Resolved settings
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    pub device_path: String,
    pub width: u32,
    pub height: u32,
    /// Lock file shared by every process that captures from the device.
    pub lock_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionSettings {
    pub tolerance: Tolerance,
    pub user_data_path: PathBuf,
    pub helper: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthSettings {
    pub timeout: Duration,
    /// Always at least 1.
    pub max_attempts: u32,
    pub device_policy: DevicePolicy,
    /// Report IGNORE to the host as `PAM_IGNORE` instead of masking it as a
    /// denial, and show per-attempt prompts. `pam_exec` collapses the exit
    /// status to `PAM_SYSTEM_ERR` either way.
    pub disclose_ignore: bool,
    pub fallback_to_password: bool,
    pub audit_log: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrollSettings {
    /// Always at least 1.
    pub samples: u32,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PamSettings {
    pub directive: DirectiveLine,
    pub services: Vec<ServiceName>,
    pub chain_dir: PathBuf,
    pub backup_dir: PathBuf,
    /// First token that marks the chain's entry-point category (e.g. `auth`).
    pub entry_point: String,
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub camera: CameraSettings,
    pub recognition: RecognitionSettings,
    pub auth: AuthSettings,
    pub enroll: EnrollSettings,
    pub pam: PamSettings,
    pub log_path: PathBuf,
    /// File the settings were read from (it may not exist).
    pub source: PathBuf,
}

impl Settings {
    /// Load the config file chosen by `paths`, falling back to defaults when it
    /// does not exist.
    pub fn load(paths: &Paths) -> Result<Self, ConfigError> {
        Self::load_from(paths, paths.config_path())
    }

    /// Load settings for the authentication entry point.
    ///
    /// Requires the installed layout, so neither the working directory nor the
    /// user config dir is consulted. An existing config file (and its
    /// directory) must be owned by root or the effective user and must not be
    /// writable by group or others.
    pub fn load_trusted(paths: &Paths) -> Result<Self, ConfigError> {
        let path = paths.config_path();
        if paths.layout != Layout::Installed {
            return Err(ConfigError::Untrusted {
                path,
                reason: "development layout".to_string(),
            });
        }
        ensure_trusted(&path)?;
        Self::load_from(paths, path)
    }

    fn load_from(paths: &Paths, path: PathBuf) -> Result<Self, ConfigError> {
        let raw = read_raw(&path)?;
        if raw.is_none() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
        }
        Self::resolve(raw.unwrap_or_default(), paths, path)
    }

    /// Parse settings from TOML text (used by tests and `config set` validation).
    pub fn from_toml(content: &str, paths: &Paths) -> Result<Self, ConfigError> {
        let source = paths.config_file.clone();
        let raw: RawConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: source.clone(),
            source: e,
        })?;
        Self::resolve(raw, paths, source)
    }

    fn resolve(raw: RawConfig, paths: &Paths, source: PathBuf) -> Result<Self, ConfigError> {
        let camera = raw.camera.unwrap_or_default();
        let recognition = raw.recognition.unwrap_or_default();
        let auth = raw.auth.unwrap_or_else(|| RawAuth {
            fallback_to_password: true,
            ..RawAuth::default()
        });
        let enroll = raw.enroll.unwrap_or_default();
        let pam = raw.pam.unwrap_or_default();
        let system = raw.system.unwrap_or_default();

        let tolerance = Tolerance::new(recognition.tolerance.unwrap_or(DEFAULT_TOLERANCE))
            .map_err(|e| ConfigError::invalid("recognition.tolerance", e))?;

        let timeout_secs = auth.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::invalid("auth.timeout_secs", "must be > 0"));
        }
        let max_attempts = auth.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
        if max_attempts == 0 {
            return Err(ConfigError::invalid("auth.max_attempts", "must be >= 1"));
        }

        let samples = enroll.samples.unwrap_or(DEFAULT_ENROLL_SAMPLES);
        if samples == 0 {
            return Err(ConfigError::invalid("enroll.samples", "must be >= 1"));
        }
        let enroll_timeout = enroll.timeout_secs.unwrap_or(DEFAULT_ENROLL_TIMEOUT_SECS);
        if enroll_timeout == 0 {
            return Err(ConfigError::invalid("enroll.timeout_secs", "must be > 0"));
        }

        let directive = DirectiveLine::new(
            pam.directive
                .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_string()),
        )
        .map_err(|e| ConfigError::invalid("pam.directive", e))?;

        let services = match pam.services {
            Some(list) => list
                .into_iter()
                .map(ServiceName::new)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| ConfigError::invalid("pam.services", e))?,
            None => DEFAULT_SERVICES
                .iter()
                .map(|s| ServiceName::new(*s))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| ConfigError::invalid("pam.services", e))?,
        };

        let entry_point = pam
            .entry_point
            .unwrap_or_else(|| DEFAULT_ENTRY_POINT.to_string());
        if entry_point.trim().is_empty() || entry_point.contains(char::is_whitespace) {
            return Err(ConfigError::invalid(
                "pam.entry_point",
                "must be a single non-empty token",
            ));
        }

        if auth.disclose_ignore && directive.runs_through_pam_exec() {
            tracing::warn!(
                directive = %directive,
                "auth.disclose_ignore set, but pam_exec reports every non-zero exit as PAM_SYSTEM_ERR"
            );
        }

        let camera_width = camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH);
        let camera_height = camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT);
        if camera_width == 0 || camera_height == 0 {
            return Err(ConfigError::invalid("camera", "width and height must be > 0"));
        }

        let resolve_or = |raw: Option<String>, default: PathBuf| {
            raw.map_or(default, |value| paths.resolve(&value))
        };

        Ok(Self {
            camera: CameraSettings {
                device_path: camera
                    .device_path
                    .map(|d| d.trim_matches(|c| c == '"' || c == '\'').to_string())
                    .unwrap_or_else(|| DEFAULT_DEVICE_PATH.to_string()),
                width: camera_width,
                height: camera_height,
                lock_path: resolve_or(camera.lock_path, paths.device_lock()),
            },
            recognition: RecognitionSettings {
                tolerance,
                user_data_path: resolve_or(recognition.user_data_path, paths.users_dir()),
                helper: resolve_or(recognition.helper, paths.helper()),
            },
            auth: AuthSettings {
                timeout: Duration::from_secs(timeout_secs),
                max_attempts,
                device_policy: auth.device_policy,
                disclose_ignore: auth.disclose_ignore,
                fallback_to_password: auth.fallback_to_password,
                audit_log: resolve_or(auth.audit_log, paths.audit_log()),
            },
            enroll: EnrollSettings {
                samples,
                timeout: Duration::from_secs(enroll_timeout),
            },
            pam: PamSettings {
                directive,
                services,
                chain_dir: resolve_or(pam.chain_dir, PathBuf::from(DEFAULT_CHAIN_DIR)),
                backup_dir: resolve_or(pam.backup_dir, paths.backup_dir()),
                entry_point,
            },
            log_path: resolve_or(system.log_path, paths.log_file.clone()),
            source,
        })
    }
}

fn untrusted(path: &Path, reason: impl Into<String>) -> ConfigError {
    ConfigError::Untrusted {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Reject a config file that someone other than root or the running user could
/// have written. A missing file is fine: defaults apply.
#[cfg(unix)]
fn ensure_trusted(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::MetadataExt;

    if !path.is_absolute() {
        return Err(untrusted(path, "path is relative"));
    }
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    if !meta.is_file() {
        return Err(untrusted(path, "not a regular file"));
    }

    // SAFETY: geteuid has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };
    let parent = path.parent().unwrap_or(Path::new("/"));
    let parent_meta = fs::metadata(parent).map_err(|source| ConfigError::Read {
        path: parent.to_path_buf(),
        source,
    })?;

    for (what, meta) in [("file", &meta), ("directory", &parent_meta)] {
        if meta.uid() != 0 && meta.uid() != euid {
            return Err(untrusted(
                path,
                format!("{what} is owned by uid {}", meta.uid()),
            ));
        }
        if meta.mode() & 0o022 != 0 {
            return Err(untrusted(
                path,
                format!(
                    "{what} mode {:o} is writable by group or others",
                    meta.mode() & 0o7777
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn ensure_trusted(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

fn read_raw(path: &Path) -> Result<Option<RawConfig>, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            tracing::warn!("Failed to read config at {:?}: {}", path, source);
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    match toml::from_str(&content) {
        Ok(config) => Ok(Some(config)),
        Err(source) => {
            tracing::warn!("Failed to parse config at {:?}: {}", path, source);
            Err(ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}

/// Keys that `persist_value` may edit.
pub const EDITABLE_KEYS: &[&str] = &[
    "camera.device_path",
    "camera.width",
    "camera.height",
    "camera.lock_path",
    "recognition.tolerance",
    "recognition.user_data_path",
    "recognition.helper",
    "auth.timeout_secs",
    "auth.max_attempts",
    "auth.device_policy",
    "auth.disclose_ignore",
    "auth.fallback_to_password",
    "auth.audit_log",
    "enroll.samples",
    "enroll.timeout_secs",
    "pam.directive",
    "pam.chain_dir",
    "pam.backup_dir",
    "pam.entry_point",
    "system.log_path",
];

/// Set one `section.key` in the config file at `path`.
///
/// Uses `toml_edit` to preserve comments and formatting. The edited document is
/// re-validated before anything is written, and the write is atomic, so a bad
/// value never reaches disk.
pub fn persist_value(
    path: &Path,
    paths: &Paths,
    dotted_key: &str,
    raw_value: &str,
) -> Result<(), ConfigError> {
    if !EDITABLE_KEYS.contains(&dotted_key) {
        return Err(ConfigError::UnknownKey(dotted_key.to_string()));
    }
    let Some((section, key)) = dotted_key.split_once('.') else {
        return Err(ConfigError::UnknownKey(dotted_key.to_string()));
    };

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let mut doc = content
        .parse::<toml_edit::DocumentMut>()
        .map_err(|source| ConfigError::Edit {
            path: path.to_path_buf(),
            source,
        })?;

    if !doc.contains_key(section) {
        doc[section] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    // Bare words such as `queue` or a path are stored as strings.
    let value = raw_value
        .parse::<toml_edit::Value>()
        .unwrap_or_else(|_| toml_edit::Value::from(raw_value));
    doc[section][key] = toml_edit::Item::Value(value);

    let serialized = doc.to_string();
    Settings::from_toml(&serialized, paths)?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }

    atomic_write_with_options(
        path,
        serialized.as_bytes(),
        AtomicWriteOptions {
            mode: PersistMode::preserve_from(path, PersistMode::Default),
            ..AtomicWriteOptions::default()
        },
    )
    .map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::info!(path = %path.display(), key = dotted_key, "Config value updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use hellou_types::DevicePolicy;

    use super::{
        ConfigError, DEFAULT_DIRECTIVE, DEFAULT_SERVICES, DEFAULT_TOLERANCE, Paths, Settings,
        ensure_trusted, persist_value,
    };

    fn dev_paths() -> Paths {
        Paths::development("/srv/hellou")
    }

    #[test]
    fn parse_empty_config_uses_defaults() {
        let settings = Settings::from_toml("", &dev_paths()).unwrap();
        assert!((settings.recognition.tolerance.value() - DEFAULT_TOLERANCE).abs() < f64::EPSILON);
        assert_eq!(settings.auth.timeout, Duration::from_secs(5));
        assert_eq!(settings.auth.max_attempts, 3);
        assert_eq!(settings.auth.device_policy, DevicePolicy::Queue);
        assert!(!settings.auth.disclose_ignore);
        assert!(settings.auth.fallback_to_password);
        assert_eq!(settings.pam.directive.as_str(), DEFAULT_DIRECTIVE);
        assert_eq!(settings.pam.services.len(), DEFAULT_SERVICES.len());
        assert_eq!(
            settings.recognition.user_data_path,
            PathBuf::from("/srv/hellou/data/users")
        );
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[camera]
device_path = "/dev/video2"
width = 1280
height = 720

[recognition]
tolerance = 0.45
user_data_path = "data/faces"
helper = "/opt/hellou/helper"

[auth]
timeout_secs = 8
max_attempts = 2
device_policy = "fail_fast"
disclose_ignore = true
fallback_to_password = false

[enroll]
samples = 3
timeout_secs = 20

[pam]
directive = "auth sufficient pam_bio.so"
services = ["sudo"]
chain_dir = "/tmp/pam.d"
entry_point = "auth"

[system]
log_path = "logs/hellou.log"
"#;
        let settings = Settings::from_toml(toml_str, &dev_paths()).unwrap();
        assert_eq!(settings.camera.device_path, "/dev/video2");
        assert_eq!(settings.camera.width, 1280);
        assert!((settings.recognition.tolerance.value() - 0.45).abs() < f64::EPSILON);
        assert_eq!(
            settings.recognition.user_data_path,
            PathBuf::from("/srv/hellou/data/faces")
        );
        assert_eq!(settings.auth.max_attempts, 2);
        assert_eq!(settings.auth.device_policy, DevicePolicy::FailFast);
        assert!(settings.auth.disclose_ignore);
        assert!(!settings.auth.fallback_to_password);
        assert_eq!(settings.enroll.samples, 3);
        assert_eq!(settings.pam.services.len(), 1);
        assert_eq!(settings.pam.chain_dir, PathBuf::from("/tmp/pam.d"));
        assert_eq!(
            settings.log_path,
            PathBuf::from("/srv/hellou/logs/hellou.log")
        );
    }

    #[test]
    fn rejects_invalid_values() {
        let cases = [
            ("[recognition]\ntolerance = -1.0\n", "recognition.tolerance"),
            ("[auth]\nmax_attempts = 0\n", "auth.max_attempts"),
            ("[auth]\ntimeout_secs = 0\n", "auth.timeout_secs"),
            ("[enroll]\nsamples = 0\n", "enroll.samples"),
            ("[pam]\ndirective = \"\"\n", "pam.directive"),
            ("[pam]\nservices = [\"../shadow\"]\n", "pam.services"),
            ("[pam]\nentry_point = \"auth required\"\n", "pam.entry_point"),
        ];
        for (toml_str, expected_key) in cases {
            match Settings::from_toml(toml_str, &dev_paths()) {
                Err(ConfigError::Invalid { key, .. }) => assert_eq!(key, expected_key),
                other => panic!("expected Invalid({expected_key}), got {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = Settings::from_toml("[recognition]\ntolerence = 0.5\n", &dev_paths());
        assert!(matches!(err, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn persist_value_preserves_comments() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "# tuned for the office camera\n[recognition]\ntolerance = 0.6\n")
            .expect("seed");

        persist_value(&path, &dev_paths(), "recognition.tolerance", "0.5").expect("persist");
        persist_value(&path, &dev_paths(), "auth.device_policy", "fail_fast").expect("persist");

        let content = fs::read_to_string(&path).expect("read");
        assert!(content.contains("# tuned for the office camera"));
        let settings = Settings::from_toml(&content, &dev_paths()).unwrap();
        assert!((settings.recognition.tolerance.value() - 0.5).abs() < f64::EPSILON);
        assert_eq!(settings.auth.device_policy, DevicePolicy::FailFast);
    }

    #[test]
    fn persist_value_refuses_invalid_edit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[auth]\nmax_attempts = 3\n").expect("seed");

        let err = persist_value(&path, &dev_paths(), "auth.max_attempts", "0");
        assert!(matches!(err, Err(ConfigError::Invalid { .. })));
        assert_eq!(
            fs::read_to_string(&path).expect("read"),
            "[auth]\nmax_attempts = 3\n"
        );

        let err = persist_value(&path, &dev_paths(), "auth.password", "hunter2");
        assert!(matches!(err, Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn load_reads_layout_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = Paths::development(dir.path());
        fs::create_dir_all(paths.config_file.parent().unwrap()).expect("mkdir");
        fs::write(&paths.config_file, "[auth]\nmax_attempts = 7\n").expect("seed");

        let settings = Settings::load(&paths).unwrap();
        assert_eq!(settings.auth.max_attempts, 7);
        assert_eq!(settings.source, paths.config_file);
    }

    #[test]
    fn trusted_load_refuses_development_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = Paths::development(dir.path());
        fs::create_dir_all(paths.config_file.parent().unwrap()).expect("mkdir");
        fs::write(&paths.config_file, "[auth]\nmax_attempts = 7\n").expect("seed");

        assert!(matches!(
            Settings::load_trusted(&paths),
            Err(ConfigError::Untrusted { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn trust_check_rejects_writable_files_and_dirs() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o700)).expect("chmod dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[auth]\nmax_attempts = 2\n").expect("seed");

        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).expect("chmod");
        ensure_trusted(&path).expect("owner-only file is trusted");
        ensure_trusted(&dir.path().join("absent.toml")).expect("missing file falls back");

        fs::set_permissions(&path, fs::Permissions::from_mode(0o666)).expect("chmod");
        assert!(matches!(
            ensure_trusted(&path),
            Err(ConfigError::Untrusted { .. })
        ));

        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).expect("chmod");
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o777)).expect("chmod dir");
        assert!(matches!(
            ensure_trusted(&path),
            Err(ConfigError::Untrusted { .. })
        ));
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o700)).expect("chmod dir");

        assert!(matches!(
            ensure_trusted(Path::new("relative/config.toml")),
            Err(ConfigError::Untrusted { .. })
        ));
    }
}
