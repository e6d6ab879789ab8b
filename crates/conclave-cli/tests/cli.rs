//! E2E tests for the `conclave` binary over a seeded tracker directory.

use assert_cmd::cargo::cargo_bin_cmd;
use chrono::{Duration as ChronoDuration, Utc};
use conclave_tracker::{
    CreateTrackerRequest, FileBackend, TrackerConfig, TrackerParticipant, TrackerStore,
};
use conclave_types::{PartyId, Role, SessionId, SessionKind};
use predicates::prelude::*;
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(10);

fn conclave_cmd(data_dir: &std::path::Path) -> assert_cmd::Command {
    let mut cmd: assert_cmd::Command = cargo_bin_cmd!("conclave");
    cmd.timeout(TIMEOUT);
    cmd.args(["--data-dir", data_dir.to_str().expect("valid utf8 path")]);
    cmd
}

/// Seeds one tracker record and returns its id.
async fn seed_session(dir: &std::path::Path, expires_in: ChronoDuration) -> SessionId {
    let backend = FileBackend::new(dir).expect("open backend");
    let store = TrackerStore::new(Arc::new(backend), TrackerConfig::default())
        .await
        .expect("open store");

    let id = SessionId::new();
    store
        .create(CreateTrackerRequest {
            session_id: id,
            kind: SessionKind::Ssh,
            hostname: "node-1".into(),
            login: "root".into(),
            host_user: "alice".into(),
            host_roles: vec![Role::new("host")],
            initiator: TrackerParticipant::new(PartyId::new(), "alice", None),
            expires: Utc::now() + expires_in,
        })
        .await
        .expect("seed record");
    id
}

#[test]
fn help_lists_subcommands() {
    let tmp = tempfile::tempdir().expect("tempdir");
    conclave_cmd(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("sessions"))
        .stdout(predicate::str::contains("prune"));
}

#[test]
fn sessions_on_empty_store_reports_none() {
    let tmp = tempfile::tempdir().expect("tempdir");
    conclave_cmd(tmp.path())
        .arg("sessions")
        .assert()
        .success()
        .stdout(predicate::str::contains("No active sessions."));
}

#[tokio::test]
async fn sessions_lists_seeded_record() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let id = seed_session(tmp.path(), ChronoDuration::hours(1)).await;

    conclave_cmd(tmp.path())
        .arg("sessions")
        .assert()
        .success()
        .stdout(predicate::str::contains(id.to_string()))
        .stdout(predicate::str::contains("alice"))
        .stdout(predicate::str::contains("pending"));
}

#[tokio::test]
async fn show_prints_full_record_as_json() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let id = seed_session(tmp.path(), ChronoDuration::hours(1)).await;

    let output = conclave_cmd(tmp.path())
        .args(["show", &id.to_string()])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let record: serde_json::Value =
        serde_json::from_slice(&output).expect("show output must be valid JSON");
    assert_eq!(record["session_id"], id.to_string());
    assert_eq!(record["host_user"], "alice");
}

#[test]
fn show_unknown_session_exits_2() {
    let tmp = tempfile::tempdir().expect("tempdir");
    conclave_cmd(tmp.path())
        .args(["show", &SessionId::new().to_string()])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn show_garbage_id_exits_2() {
    let tmp = tempfile::tempdir().expect("tempdir");
    conclave_cmd(tmp.path())
        .args(["show", "not-a-uuid"])
        .assert()
        .code(2);
}

#[tokio::test]
async fn prune_sweeps_expired_entries() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let stale = seed_session(tmp.path(), ChronoDuration::seconds(-10)).await;
    let live = seed_session(tmp.path(), ChronoDuration::hours(1)).await;

    conclave_cmd(tmp.path())
        .arg("prune")
        .assert()
        .success()
        .stdout(predicate::str::contains(stale.to_string()));

    conclave_cmd(tmp.path())
        .arg("sessions")
        .assert()
        .success()
        .stdout(predicate::str::contains(live.to_string()))
        .stdout(predicate::str::contains(stale.to_string()).not());
}

#[test]
fn prune_on_empty_store_reports_nothing() {
    let tmp = tempfile::tempdir().expect("tempdir");
    conclave_cmd(tmp.path())
        .arg("prune")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to prune."));
}

#[test]
fn missing_data_dir_flag_fails() {
    let mut cmd: assert_cmd::Command = cargo_bin_cmd!("conclave");
    cmd.timeout(TIMEOUT);
    cmd.arg("sessions").assert().failure();
}
