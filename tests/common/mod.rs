//! Shared test utilities and fixtures
//!
//! A [`Sandbox`] is a throwaway installation: config file, enrollment store,
//! PAM chain directory and a scripted capture/extraction helper, all under one
//! temp dir.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use hellou_types::EMBEDDING_DIM;

pub const DIRECTIVE: &str = "auth sufficient pam_exec.so quiet /usr/bin/hellou auth";

pub struct Sandbox {
    dir: tempfile::TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        fs::set_permissions(root, fs::Permissions::from_mode(0o700)).expect("chmod root");
        fs::create_dir_all(root.join("pam.d")).expect("pam.d");

        let config = format!(
            r#"# sandbox config
[camera]
lock_path = "{root}/camera.lock"

[recognition]
tolerance = 0.6
user_data_path = "{root}/users"
helper = "{root}/helper.sh"

[auth]
timeout_secs = 10
max_attempts = 2
audit_log = "{root}/audit.jsonl"

[enroll]
samples = 2
timeout_secs = 10

[pam]
directive = "{DIRECTIVE}"
services = ["sudo", "login"]
chain_dir = "{root}/pam.d"
backup_dir = "{root}/backups"

[system]
log_path = "{root}/hellou.log"
"#,
            root = root.display()
        );
        // `hellou auth` refuses config that others could have written.
        fs::write(root.join("config.toml"), config).expect("config");
        fs::set_permissions(root.join("config.toml"), fs::Permissions::from_mode(0o600))
            .expect("chmod config");

        let helper = format!(
            "#!/bin/sh\ncase \"$1\" in\n  capture) echo x >> '{}'; printf 'frame' ;;\n  extract) cat >/dev/null; cat '{}' ;;\n  *) exit 64 ;;\nesac\n",
            root.join("captures.log").display(),
            root.join("faces.json").display()
        );
        let helper_path = root.join("helper.sh");
        fs::write(&helper_path, helper).expect("helper");
        fs::set_permissions(&helper_path, fs::Permissions::from_mode(0o755)).expect("chmod");

        let sandbox = Self { dir };
        sandbox.set_faces(&[]);
        sandbox
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.root().join("config.toml")
    }

    pub fn users_dir(&self) -> PathBuf {
        self.root().join("users")
    }

    pub fn chain(&self, service: &str) -> PathBuf {
        self.root().join("pam.d").join(service)
    }

    pub fn helper(&self) -> PathBuf {
        self.root().join("helper.sh")
    }

    pub fn device_lock(&self) -> PathBuf {
        self.root().join("camera.lock")
    }

    /// Number of times the helper was asked for a frame.
    pub fn captures(&self) -> usize {
        fs::read_to_string(self.root().join("captures.log"))
            .map(|log| log.lines().count())
            .unwrap_or(0)
    }

    /// Faces the helper reports on every frame, one per fill value.
    pub fn set_faces(&self, fills: &[f64]) {
        let faces: Vec<Vec<f64>> = fills.iter().map(|&f| vec![f; EMBEDDING_DIM]).collect();
        let body = serde_json::json!({ "embeddings": faces });
        fs::write(self.root().join("faces.json"), body.to_string()).expect("faces");
    }

    /// A JSON embedding file suitable for `hellou add --from-file`.
    pub fn embedding_file(&self, name: &str, fill: f64) -> PathBuf {
        let path = self.root().join(name);
        let values = vec![fill; EMBEDDING_DIM];
        fs::write(&path, serde_json::to_string(&values).expect("json")).expect("embedding");
        path
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_hellou"));
        cmd.current_dir(self.root())
            .env("HELLOU_CONFIG", self.config_path())
            .env_remove("PAM_USER")
            .env_remove("RUST_LOG");
        cmd
    }

    pub fn hellou(&self, args: &[&str]) -> Output {
        self.command().args(args).output().expect("run hellou")
    }

    pub fn audit(&self) -> Vec<serde_json::Value> {
        let content = fs::read_to_string(self.root().join("audit.jsonl")).unwrap_or_default();
        content
            .lines()
            .map(|line| serde_json::from_str(line).expect("audit line"))
            .collect()
    }
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
