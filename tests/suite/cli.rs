//! End-to-end runs of the `hellou` binary against a sandbox install.

use std::fs;
use std::os::unix::fs::PermissionsExt;

use hellou_utils::{FileLock, LockKind};

use crate::common::{Sandbox, stderr, stdout};

#[test]
fn unknown_user_reads_as_failure_by_default() {
    let sb = Sandbox::new();
    sb.set_faces(&[0.2]);

    let out = sb.hellou(&["auth", "--user", "bob"]);

    assert_eq!(out.status.code(), Some(7), "stderr: {}", stderr(&out));
    assert!(stdout(&out).contains("Face authentication failed."));
    assert!(!stdout(&out).contains("Looking for face"));

    let audit = sb.audit();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0]["outcome"], "ignore");
    assert_eq!(audit[0]["attempts"], 0);
}

#[test]
fn disclosed_ignore_exits_with_pam_ignore() {
    let sb = Sandbox::new();
    let set = sb.hellou(&["config", "set", "auth.disclose_ignore", "true"]);
    assert!(set.status.success(), "stderr: {}", stderr(&set));

    let out = sb.hellou(&["auth", "--user", "bob"]);
    assert_eq!(out.status.code(), Some(25));

    let config = fs::read_to_string(sb.config_path()).unwrap();
    assert!(config.starts_with("# sandbox config"));
    assert!(config.contains("disclose_ignore = true"));
}

#[test]
fn enrolled_face_authenticates_and_stranger_is_denied() {
    let sb = Sandbox::new();
    let reference = sb.embedding_file("alice.json", 0.25);
    let add = sb.hellou(&["add", "alice", "--from-file", reference.to_str().unwrap()]);
    assert!(add.status.success(), "stderr: {}", stderr(&add));

    sb.set_faces(&[0.25]);
    let ok = sb.hellou(&["auth", "--user", "alice"]);
    assert_eq!(ok.status.code(), Some(0), "stderr: {}", stderr(&ok));
    assert!(stdout(&ok).contains("Face recognized."));

    sb.set_faces(&[0.9]);
    let denied = sb.hellou(&["auth", "--user", "alice"]);
    assert_eq!(denied.status.code(), Some(7));
    let text = stdout(&denied);
    assert!(text.contains("Face authentication failed."));
    assert!(text.contains("Falling back to password authentication."));
    assert_eq!(sb.captures(), 3);

    let outcomes: Vec<_> = sb
        .audit()
        .iter()
        .map(|r| r["outcome"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(outcomes, vec!["success", "deny"]);
}

#[test]
fn pam_user_environment_names_the_identity() {
    let sb = Sandbox::new();
    let reference = sb.embedding_file("ref.json", 0.1);
    assert!(
        sb.hellou(&["add", "dave", "--from-file", reference.to_str().unwrap()])
            .status
            .success()
    );
    sb.set_faces(&[0.1]);

    let out = sb
        .command()
        .args(["auth"])
        .env("PAM_USER", "dave")
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
}

#[test]
fn frames_with_two_faces_never_authenticate() {
    let sb = Sandbox::new();
    let reference = sb.embedding_file("ref.json", 0.3);
    sb.hellou(&["add", "erin", "--from-file", reference.to_str().unwrap()]);
    sb.set_faces(&[0.3, 0.3]);

    let out = sb.hellou(&["auth", "--user", "erin"]);
    assert_eq!(out.status.code(), Some(7));
    let audit = sb.audit();
    assert_eq!(audit[0]["reason"], "attempts_exhausted");
    assert_eq!(audit[0]["attempts"], 2);
}

#[test]
fn re_enrollment_requires_force() {
    let sb = Sandbox::new();
    let first = sb.embedding_file("first.json", 0.1);
    let second = sb.embedding_file("second.json", 0.7);

    assert!(sb.hellou(&["add", "carol", "--from-file", first.to_str().unwrap()]).status.success());
    let refused = sb.hellou(&["add", "carol", "--from-file", second.to_str().unwrap()]);
    assert!(!refused.status.success());
    assert!(stderr(&refused).contains("--force"));

    let forced = sb.hellou(&[
        "add",
        "carol",
        "--force",
        "--from-file",
        second.to_str().unwrap(),
    ]);
    assert!(forced.status.success(), "stderr: {}", stderr(&forced));

    sb.set_faces(&[0.7]);
    assert_eq!(sb.hellou(&["auth", "--user", "carol"]).status.code(), Some(0));
}

#[test]
fn capture_enrollment_then_list_and_remove() {
    let sb = Sandbox::new();
    sb.set_faces(&[0.4]);

    let add = sb.hellou(&["add", "frank", "--samples", "3"]);
    assert!(add.status.success(), "stderr: {}", stderr(&add));
    assert!(stdout(&add).contains("sample 3/3 captured"));

    let list = sb.hellou(&["list"]);
    assert!(stdout(&list).starts_with("frank\t"));

    let test = sb.hellou(&["test"]);
    assert!(stdout(&test).contains("1 face detected"));

    assert!(stdout(&sb.hellou(&["remove", "frank"])).contains("Removed enrollment"));
    assert!(stdout(&sb.hellou(&["remove", "frank"])).contains("was not enrolled"));
    assert!(stdout(&sb.hellou(&["list"])).contains("No enrolled users"));
}

#[test]
fn invalid_user_names_are_rejected() {
    let sb = Sandbox::new();
    let out = sb.hellou(&["remove", "../etc/passwd"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("invalid user name"));
}

#[test]
fn install_status_uninstall_round_trip() {
    let sb = Sandbox::new();
    let original = b"#%PAM-1.0\n\n# sudo\nauth       include      system-auth\naccount    include      system-account";
    fs::write(sb.chain("sudo"), original).unwrap();

    let install = sb.hellou(&["install"]);
    assert!(install.status.success(), "stderr: {}", stderr(&install));
    let text = stdout(&install);
    assert!(text.contains("sudo: installed"));
    assert!(text.contains("login: skipped"));

    let chain = fs::read_to_string(sb.chain("sudo")).unwrap();
    assert!(chain.contains(&format!(
        "auth       include      system-auth\n{}\n",
        crate::common::DIRECTIVE
    )));

    let status = stdout(&sb.hellou(&["status"]));
    assert!(status.contains("sudo: installed"));
    assert!(status.contains("login: no chain"));

    let again = stdout(&sb.hellou(&["install", "--service", "sudo"]));
    assert!(again.contains("sudo: unchanged"));

    let uninstall = sb.hellou(&["uninstall"]);
    assert!(uninstall.status.success(), "stderr: {}", stderr(&uninstall));
    assert_eq!(fs::read(sb.chain("sudo")).unwrap(), original);
    assert!(stdout(&sb.hellou(&["status"])).contains("sudo: not installed"));
}

#[test]
fn config_set_rejects_invalid_values() {
    let sb = Sandbox::new();
    let before = fs::read(sb.config_path()).unwrap();

    let zero = sb.hellou(&["config", "set", "auth.max_attempts", "0"]);
    assert!(!zero.status.success());
    let unknown = sb.hellou(&["config", "set", "auth.password", "hunter2"]);
    assert!(!unknown.status.success());

    assert_eq!(fs::read(sb.config_path()).unwrap(), before);
}

#[test]
fn denial_reads_exactly_like_an_unknown_user() {
    let sb = Sandbox::new();
    let reference = sb.embedding_file("alice.json", 0.25);
    sb.hellou(&["add", "alice", "--from-file", reference.to_str().unwrap()]);
    sb.set_faces(&[0.9]);

    let denied = sb.hellou(&["auth", "--user", "alice"]);
    let unknown = sb.hellou(&["auth", "--user", "mallory"]);

    assert_eq!(denied.status.code(), unknown.status.code());
    assert_eq!(stdout(&denied), stdout(&unknown));
    assert!(!stdout(&denied).contains("Looking for face"));
}

#[test]
fn disclosed_mode_shows_attempt_prompts() {
    let sb = Sandbox::new();
    assert!(
        sb.hellou(&["config", "set", "auth.disclose_ignore", "true"])
            .status
            .success()
    );
    let reference = sb.embedding_file("alice.json", 0.25);
    sb.hellou(&["add", "alice", "--from-file", reference.to_str().unwrap()]);
    sb.set_faces(&[0.9]);

    let text = stdout(&sb.hellou(&["auth", "--user", "alice"]));
    assert!(text.contains("Looking for face... (attempt 1/2)"));
    assert!(text.contains("Face not recognized. Please try again."));
    assert!(text.contains("(attempt 2/2)"));

    let unknown = stdout(&sb.hellou(&["auth", "--user", "mallory"]));
    assert!(unknown.contains("No face enrolled for mallory."));
}

#[test]
fn auth_ignores_config_planted_in_working_directory() {
    let sb = Sandbox::new();
    let attacker = tempfile::tempdir().unwrap();
    let root = attacker.path();
    fs::create_dir_all(root.join("config")).unwrap();

    let marker = root.join("helper-ran");
    let faces = serde_json::json!({ "embeddings": [vec![0.5; hellou_types::EMBEDDING_DIM]] });
    fs::write(root.join("faces.json"), faces.to_string()).unwrap();
    let helper = format!(
        "#!/bin/sh\ntouch '{}'\ncase \"$1\" in\n  capture) printf 'frame' ;;\n  extract) cat >/dev/null; cat '{}' ;;\nesac\n",
        marker.display(),
        root.join("faces.json").display()
    );
    fs::write(root.join("evil.sh"), helper).unwrap();
    fs::set_permissions(root.join("evil.sh"), fs::Permissions::from_mode(0o755)).unwrap();
    fs::write(
        root.join("config").join("config.toml"),
        format!(
            "[recognition]\nuser_data_path = \"users\"\nhelper = \"{}\"\n",
            root.join("evil.sh").display()
        ),
    )
    .unwrap();
    let reference = sb.embedding_file("root.json", 0.5);

    let run = |args: &[&str]| {
        sb.command()
            .current_dir(root)
            .env_remove("HELLOU_CONFIG")
            .args(args)
            .output()
            .unwrap()
    };

    // Non-auth commands still honor the development layout.
    let add = run(&["add", "root", "--from-file", reference.to_str().unwrap()]);
    assert!(add.status.success(), "stderr: {}", stderr(&add));
    assert!(root.join("users").join("root.json").exists());

    let auth = run(&["auth", "--user", "root"]);
    assert_eq!(auth.status.code(), Some(7), "stderr: {}", stderr(&auth));
    assert!(!stdout(&auth).contains("Face recognized."));
    assert!(!marker.exists(), "planted helper must never run");
}

#[test]
fn auth_refuses_config_writable_by_others() {
    let sb = Sandbox::new();
    let reference = sb.embedding_file("alice.json", 0.25);
    sb.hellou(&["add", "alice", "--from-file", reference.to_str().unwrap()]);
    sb.set_faces(&[0.25]);
    fs::set_permissions(sb.config_path(), fs::Permissions::from_mode(0o666)).unwrap();

    let out = sb.hellou(&["auth", "--user", "alice"]);

    assert_eq!(out.status.code(), Some(7));
    assert!(stderr(&out).contains("refusing untrusted config"), "{}", stderr(&out));
    assert_eq!(sb.captures(), 0);
    assert!(sb.audit().is_empty());
}

#[test]
fn explicitly_named_missing_service_is_an_error() {
    let sb = Sandbox::new();

    let install = sb.hellou(&["install", "--service", "nosuch"]);
    assert!(!install.status.success());
    assert!(
        stderr(&install).contains("no directive chain for service nosuch"),
        "{}",
        stderr(&install)
    );
    assert!(!stdout(&install).contains("skipped"));

    let uninstall = sb.hellou(&["uninstall", "--service", "nosuch"]);
    assert!(!uninstall.status.success());
    assert!(stderr(&uninstall).contains("no directive chain for service nosuch"));
}

#[test]
fn fail_fast_session_skips_device_held_by_another_process() {
    let sb = Sandbox::new();
    let set = sb.hellou(&["config", "set", "auth.device_policy", "fail_fast"]);
    assert!(set.status.success(), "stderr: {}", stderr(&set));
    let reference = sb.embedding_file("alice.json", 0.25);
    sb.hellou(&["add", "alice", "--from-file", reference.to_str().unwrap()]);
    sb.set_faces(&[0.25]);

    let held = FileLock::try_acquire(sb.device_lock(), LockKind::Exclusive)
        .unwrap()
        .unwrap();
    let busy = sb.hellou(&["auth", "--user", "alice"]);
    assert_eq!(busy.status.code(), Some(7), "stderr: {}", stderr(&busy));
    assert_eq!(sb.captures(), 0);
    let audit = sb.audit();
    assert_eq!(audit[0]["reason"], "attempts_exhausted");
    assert_eq!(audit[0]["attempts"], 2);

    drop(held);
    let ok = sb.hellou(&["auth", "--user", "alice"]);
    assert_eq!(ok.status.code(), Some(0), "stderr: {}", stderr(&ok));
    assert_eq!(sb.captures(), 1);
}

#[test]
fn queued_session_waits_for_device_until_deadline() {
    let sb = Sandbox::new();
    assert!(
        sb.hellou(&["config", "set", "auth.timeout_secs", "1"])
            .status
            .success()
    );
    let reference = sb.embedding_file("alice.json", 0.25);
    sb.hellou(&["add", "alice", "--from-file", reference.to_str().unwrap()]);
    sb.set_faces(&[0.25]);

    let _held = FileLock::try_acquire(sb.device_lock(), LockKind::Exclusive)
        .unwrap()
        .unwrap();
    let out = sb.hellou(&["auth", "--user", "alice"]);

    assert_eq!(out.status.code(), Some(7), "stderr: {}", stderr(&out));
    assert_eq!(sb.captures(), 0);
    let audit = sb.audit();
    assert_eq!(audit[0]["reason"], "deadline_elapsed");
    assert_eq!(audit[0]["attempts"], 1);
}
