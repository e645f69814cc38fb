//! Directive-chain behavior driven through configuration, as the binary does.

use std::fs;

use hellou_config::{Paths, Settings};
use hellou_pam::{ChainMutator, UninstallStatus};
use hellou_types::{DirectiveLine, ServiceName};

fn mutator_for(root: &std::path::Path, extra: &str) -> (Settings, ChainMutator) {
    let paths = Paths::development(root);
    let toml = format!(
        "[pam]\nchain_dir = \"pam.d\"\nbackup_dir = \"backups\"\n{extra}"
    );
    let settings = Settings::from_toml(&toml, &paths).unwrap();
    let mutator = ChainMutator::new(
        &settings.pam.chain_dir,
        &settings.pam.backup_dir,
        settings.pam.entry_point.clone(),
    );
    (settings, mutator)
}

#[test]
fn bio_directive_lands_after_unix_and_comes_back_out() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("pam.d")).unwrap();
    let (settings, mutator) = mutator_for(
        dir.path(),
        "directive = \"auth sufficient pam_bio.so\"\nservices = [\"login\"]\n",
    );
    let chain = dir.path().join("pam.d").join("login");
    fs::write(&chain, "auth required pam_unix.so\n").unwrap();

    let report = mutator
        .install_all(&settings.pam.services, &settings.pam.directive)
        .unwrap();
    assert_eq!(report.changed.len(), 1);

    let lines: Vec<String> = fs::read_to_string(&chain)
        .unwrap()
        .lines()
        .map(str::to_owned)
        .collect();
    assert_eq!(
        lines,
        vec!["auth required pam_unix.so", "auth sufficient pam_bio.so"]
    );

    mutator
        .uninstall_all(&settings.pam.services, &settings.pam.directive)
        .unwrap();
    assert_eq!(fs::read_to_string(&chain).unwrap(), "auth required pam_unix.so\n");
}

#[test]
fn default_directive_with_custom_entry_point() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("pam.d")).unwrap();
    let (settings, mutator) = mutator_for(dir.path(), "entry_point = \"@include\"\n");
    let service = ServiceName::new("sudo").unwrap();
    let chain = dir.path().join("pam.d").join("sudo");
    let original = "#%PAM-1.0\nsession required pam_env.so\n@include common-auth\n@include common-account\n";
    fs::write(&chain, original).unwrap();

    mutator.install(&service, &settings.pam.directive).unwrap();
    let installed = fs::read_to_string(&chain).unwrap();
    assert!(installed.contains(&format!(
        "@include common-auth\n{}\n@include common-account",
        settings.pam.directive
    )));

    assert_eq!(
        mutator.uninstall(&service, &settings.pam.directive).unwrap(),
        UninstallStatus::Restored { preserved: None }
    );
    assert_eq!(fs::read_to_string(&chain).unwrap(), original);
}

#[test]
fn reinstall_after_uninstall_takes_a_fresh_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("pam.d")).unwrap();
    let (_, mutator) = mutator_for(dir.path(), "");
    let service = ServiceName::new("su").unwrap();
    let directive = DirectiveLine::new("auth sufficient pam_bio.so").unwrap();
    let chain = dir.path().join("pam.d").join("su");

    fs::write(&chain, "auth required pam_unix.so\n").unwrap();
    mutator.install(&service, &directive).unwrap();
    mutator.uninstall(&service, &directive).unwrap();
    assert!(!mutator.has_snapshot(&service));

    // The admin changes the chain between installs; the new baseline wins.
    fs::write(&chain, "auth required pam_unix.so nullok\n").unwrap();
    mutator.install(&service, &directive).unwrap();
    mutator.uninstall(&service, &directive).unwrap();
    assert_eq!(
        fs::read_to_string(&chain).unwrap(),
        "auth required pam_unix.so nullok\n"
    );
}
