//! Enrollment and authentication sharing one store across processes.

use std::time::Duration;

use hellou_engine::{
    CaptureTarget, DeviceGate, FileAuditSink, HelperCapture, HelperExtractor, Resolution, Sensor,
    SessionController, SessionPolicy,
};
use hellou_store::EnrollmentStore;
use hellou_types::{DevicePolicy, EMBEDDING_DIM, Embedding, Identity, Outcome, Tolerance};

use crate::common::{Sandbox, stderr};

fn face(fill: f64) -> Embedding {
    Embedding::new(vec![fill; EMBEDDING_DIM]).unwrap()
}

fn controller(sb: &Sandbox, max_attempts: u32) -> SessionController {
    let sensor = Sensor::new(
        Box::new(HelperCapture::new(
            sb.helper(),
            CaptureTarget {
                device: "/dev/video0".into(),
                width: 640,
                height: 480,
            },
        )),
        Box::new(HelperExtractor::new(sb.helper())),
        DeviceGate::new(DevicePolicy::FailFast),
    );
    SessionController::new(
        EnrollmentStore::open(sb.users_dir()).unwrap(),
        sensor,
        SessionPolicy {
            tolerance: Tolerance::new(0.6).unwrap(),
            timeout: Duration::from_secs(10),
            max_attempts,
        },
        Box::new(FileAuditSink::new(sb.root().join("audit.jsonl"))),
    )
}

#[test]
fn re_enrollment_keeps_one_record_with_the_new_embedding() {
    let sb = Sandbox::new();
    let store = EnrollmentStore::open(sb.users_dir()).unwrap();
    let alice = Identity::new("alice").unwrap();

    store.enroll(&alice, &face(0.1)).unwrap();
    store.enroll(&alice, &face(0.8)).unwrap();

    let reopened = EnrollmentStore::open(sb.users_dir()).unwrap();
    assert_eq!(reopened.identities().unwrap(), vec![alice.clone()]);
    assert_eq!(reopened.lookup(&alice).unwrap(), Some(face(0.8)));
}

#[test]
fn enrollment_fails_fast_while_a_session_holds_the_identity() {
    let sb = Sandbox::new();
    let store = EnrollmentStore::open(sb.users_dir()).unwrap();
    let alice = Identity::new("alice").unwrap();
    store.enroll(&alice, &face(0.1)).unwrap();

    let lease = store.lease(&alice).unwrap();
    let reference = sb.embedding_file("new.json", 0.5);
    let out = sb.hellou(&[
        "add",
        "alice",
        "--force",
        "--from-file",
        reference.to_str().unwrap(),
    ]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("busy"), "stderr: {}", stderr(&out));

    drop(lease);
    let retry = sb.hellou(&[
        "add",
        "alice",
        "--force",
        "--from-file",
        reference.to_str().unwrap(),
    ]);
    assert!(retry.status.success(), "stderr: {}", stderr(&retry));
    assert_eq!(store.lookup(&alice).unwrap(), Some(face(0.5)));
}

#[tokio::test]
async fn helper_process_session_matches_enrolled_face() {
    let sb = Sandbox::new();
    let alice = Identity::new("alice").unwrap();
    EnrollmentStore::open(sb.users_dir())
        .unwrap()
        .enroll(&alice, &face(0.2))
        .unwrap();

    sb.set_faces(&[0.22]);
    let report = controller(&sb, 3).authenticate(&alice).await.unwrap();
    assert_eq!(report.outcome, Outcome::Success);
    assert_eq!(report.attempts, 1);

    sb.set_faces(&[]);
    let report = controller(&sb, 3).authenticate(&alice).await.unwrap();
    assert_eq!(report.outcome, Outcome::Deny);
    assert_eq!(report.reason, Resolution::AttemptsExhausted);
    assert_eq!(report.attempts, 3);

    let bob = Identity::new("bob").unwrap();
    let report = controller(&sb, 3).authenticate(&bob).await.unwrap();
    assert_eq!(report.outcome, Outcome::Ignore);
    assert_eq!(report.attempts, 0);

    assert_eq!(sb.audit().len(), 3);
}
