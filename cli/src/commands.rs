//! Subcommand implementations.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};

use hellou_config::{Paths, Settings, persist_value};
use hellou_engine::{
    AttemptFailure, CaptureTarget, DeviceGate, EnrollPlan, EnrollProgress, FileAuditSink,
    HelperCapture, HelperExtractor, MatchingEngine, NoopObserver, Sensor, SessionController,
    SessionObserver, SessionPolicy, TracingAuditSink, collect_reference,
};
use hellou_pam::{ChainError, ChainMutator, InstallReport, InstallStatus, UninstallStatus};
use hellou_store::EnrollmentStore;
use hellou_types::{Identity, Outcome, ServiceName};

use crate::{Command, ConfigAction};

const FAILED_MESSAGE: &str = "Face authentication failed.";
const FALLBACK_MESSAGE: &str = "Falling back to password authentication.";

pub async fn run(command: Command, paths: &Paths, settings: &Settings) -> Result<ExitCode> {
    match command {
        Command::Add {
            user,
            samples,
            force,
            from_file,
        } => add(settings, &user, samples, force, from_file).await,
        Command::Remove { user } => remove(settings, &user),
        Command::List => list(settings),
        Command::Auth { user } => auth(settings, &user).await,
        Command::Test => test(settings).await,
        Command::Install { services } => install(settings, &services),
        Command::Uninstall { services } => uninstall(settings, &services),
        Command::Status => status(settings),
        Command::Config {
            action: ConfigAction::Set { key, value },
        } => {
            persist_value(&settings.source, paths, &key, &value)
                .with_context(|| format!("failed to set {key}"))?;
            println!("Set {key} = {value} in {}", settings.source.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn identity(user: &str) -> Result<Identity> {
    Identity::new(user).with_context(|| format!("invalid user name {user:?}"))
}

fn open_store(settings: &Settings) -> Result<EnrollmentStore> {
    let dir = &settings.recognition.user_data_path;
    EnrollmentStore::open(dir)
        .with_context(|| format!("failed to open enrollment store at {}", dir.display()))
}

fn sensor(settings: &Settings) -> Sensor {
    let helper = settings.recognition.helper.clone();
    let target = CaptureTarget {
        device: PathBuf::from(&settings.camera.device_path),
        width: settings.camera.width,
        height: settings.camera.height,
    };
    Sensor::new(
        Box::new(HelperCapture::new(helper.clone(), target)),
        Box::new(HelperExtractor::new(helper)),
        DeviceGate::new(settings.auth.device_policy).with_lock_file(&settings.camera.lock_path),
    )
}

fn mutator(settings: &Settings) -> ChainMutator {
    ChainMutator::new(
        &settings.pam.chain_dir,
        &settings.pam.backup_dir,
        settings.pam.entry_point.clone(),
    )
}

fn named_services(requested: &[String]) -> Result<Vec<ServiceName>> {
    requested
        .iter()
        .map(|name| {
            ServiceName::new(name.as_str())
                .map_err(ChainError::from)
                .with_context(|| format!("invalid service {name:?}"))
        })
        .collect()
}

async fn add(
    settings: &Settings,
    user: &str,
    samples: Option<u32>,
    force: bool,
    from_file: Option<PathBuf>,
) -> Result<ExitCode> {
    let identity = identity(user)?;
    let store = open_store(settings)?;

    if !force && store.lookup(&identity)?.is_some() {
        bail!("{identity} is already enrolled; pass --force to replace the enrollment");
    }

    if let Some(path) = from_file {
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let values: Vec<f64> = serde_json::from_str(&text)
            .with_context(|| format!("{} is not a JSON array of numbers", path.display()))?;
        store.enroll_values(&identity, values)?;
        println!("Enrolled {identity} from {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let plan = EnrollPlan {
        samples: samples.unwrap_or(settings.enroll.samples) as usize,
        timeout: settings.enroll.timeout,
    };
    println!(
        "Enrolling {identity}: look at the camera ({} samples, {}s limit)",
        plan.samples,
        plan.timeout.as_secs()
    );

    let sensor = sensor(settings);
    let reference = collect_reference(&sensor, &MatchingEngine::new(), plan, |progress| {
        match progress {
            EnrollProgress::Accepted { collected, wanted } => {
                println!("  sample {collected}/{wanted} captured");
            }
            EnrollProgress::Rejected(rejected) if rejected.detected == 0 => {
                println!("  no face detected, adjust your position");
            }
            EnrollProgress::Rejected(rejected) => {
                println!(
                    "  {} faces detected, make sure only you are in frame",
                    rejected.detected
                );
            }
            EnrollProgress::Retrying(reason) => {
                tracing::debug!("Enrollment frame skipped: {reason}");
            }
        }
    })
    .await
    .context("enrollment capture failed")?;

    store.enroll(&identity, &reference)?;
    println!("Enrolled {identity}");
    Ok(ExitCode::SUCCESS)
}

fn remove(settings: &Settings, user: &str) -> Result<ExitCode> {
    let identity = identity(user)?;
    if open_store(settings)?.remove(&identity)? {
        println!("Removed enrollment for {identity}");
    } else {
        println!("{identity} was not enrolled");
    }
    Ok(ExitCode::SUCCESS)
}

fn list(settings: &Settings) -> Result<ExitCode> {
    let store = open_store(settings)?;
    let identities = store.identities()?;
    if identities.is_empty() {
        println!("No enrolled users");
        return Ok(ExitCode::SUCCESS);
    }
    for identity in identities {
        match store.record(&identity) {
            Ok(Some(record)) => println!(
                "{identity}\tenrolled {}\tupdated {}",
                record.created_at.format("%Y-%m-%d %H:%M"),
                record.updated_at.format("%Y-%m-%d %H:%M"),
            ),
            Ok(None) => {}
            Err(e) => println!("{identity}\t({e})"),
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Prints the same prompts the PAM conversation showed historically.
///
/// Only attached when IGNORE is disclosed: the prompts appear only for
/// enrolled identities, so they would reveal enrollment.
struct ConsoleObserver;

impl SessionObserver for ConsoleObserver {
    fn attempt_started(&self, attempt: u32, max_attempts: u32) {
        println!("Looking for face... (attempt {attempt}/{max_attempts})");
    }

    fn attempt_failed(&self, attempt: u32, failure: &AttemptFailure) {
        tracing::debug!(attempt, ?failure, "Attempt failed");
        if matches!(failure, AttemptFailure::NoMatch { .. }) {
            println!("Face not recognized. Please try again.");
        }
    }
}

async fn auth(settings: &Settings, user: &str) -> Result<ExitCode> {
    let identity = identity(user)?;
    let policy = SessionPolicy {
        tolerance: settings.recognition.tolerance,
        timeout: settings.auth.timeout,
        max_attempts: settings.auth.max_attempts,
    };
    let audit = (
        TracingAuditSink,
        FileAuditSink::new(&settings.auth.audit_log),
    );
    let controller =
        SessionController::new(open_store(settings)?, sensor(settings), policy, Box::new(audit));

    let observer: &dyn SessionObserver = if settings.auth.disclose_ignore {
        &ConsoleObserver
    } else {
        &NoopObserver
    };
    let report = controller.authenticate_with(&identity, observer).await?;

    match report.outcome {
        Outcome::Success => println!("Face recognized."),
        Outcome::Ignore if settings.auth.disclose_ignore => {
            println!("No face enrolled for {identity}.");
        }
        Outcome::Deny | Outcome::Ignore => {
            println!("{FAILED_MESSAGE}");
            if settings.auth.fallback_to_password {
                println!("{FALLBACK_MESSAGE}");
            }
        }
    }

    let code = report.outcome.pam_code(settings.auth.disclose_ignore);
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX)))
}

async fn test(settings: &Settings) -> Result<ExitCode> {
    let sensor = sensor(settings);
    println!(
        "Capturing from {} ({}x{})",
        settings.camera.device_path, settings.camera.width, settings.camera.height
    );
    let frame = sensor.capture().await.context("capture failed")?;
    println!("Captured frame ({} bytes)", frame.len());
    let faces = sensor.extract(frame).await.context("extraction failed")?;
    match faces.len() {
        0 => println!("No face detected"),
        1 => println!("1 face detected"),
        n => println!("{n} faces detected"),
    }
    Ok(ExitCode::SUCCESS)
}

fn print_report(verb: &str, report: &InstallReport) {
    for service in &report.changed {
        println!("{service}: {verb}");
    }
    for service in &report.unchanged {
        println!("{service}: unchanged");
    }
    for service in &report.skipped {
        println!("{service}: skipped (no chain on this host)");
    }
}

/// Without `--service`, every configured service is tried and missing chains
/// are skipped. A service named explicitly must exist.
fn install(settings: &Settings, requested: &[String]) -> Result<ExitCode> {
    let mutator = mutator(settings);
    let directive = &settings.pam.directive;
    let report = if requested.is_empty() {
        mutator
            .install_all(&settings.pam.services, directive)
            .context("install failed")?
    } else {
        let mut report = InstallReport::default();
        for service in named_services(requested)? {
            let status = mutator
                .install(&service, directive)
                .with_context(|| format!("install into {service} failed"))?;
            match status {
                InstallStatus::Installed => report.changed.push(service),
                InstallStatus::AlreadyInstalled => report.unchanged.push(service),
            }
        }
        report
    };
    print_report("installed", &report);
    Ok(ExitCode::SUCCESS)
}

fn uninstall(settings: &Settings, requested: &[String]) -> Result<ExitCode> {
    let mutator = mutator(settings);
    let directive = &settings.pam.directive;
    let report = if requested.is_empty() {
        mutator
            .uninstall_all(&settings.pam.services, directive)
            .context("uninstall failed")?
    } else {
        let mut report = InstallReport::default();
        for service in named_services(requested)? {
            let status = mutator
                .uninstall(&service, directive)
                .with_context(|| format!("uninstall from {service} failed"))?;
            match status {
                UninstallStatus::NotInstalled => report.unchanged.push(service),
                UninstallStatus::Restored { .. } | UninstallStatus::Removed { .. } => {
                    report.changed.push(service);
                }
            }
        }
        report
    };
    print_report("restored", &report);
    Ok(ExitCode::SUCCESS)
}

fn status(settings: &Settings) -> Result<ExitCode> {
    let mutator = mutator(settings);
    for service in &settings.pam.services {
        let state = match mutator.is_installed(service, &settings.pam.directive) {
            Ok(true) => "installed",
            Ok(false) if mutator.has_snapshot(service) => "snapshot present, directive missing",
            Ok(false) => "not installed",
            Err(ChainError::ServiceChainNotFound { .. }) => "no chain",
            Err(e) => return Err(e.into()),
        };
        println!("{service}: {state}");
    }
    Ok(ExitCode::SUCCESS)
}
