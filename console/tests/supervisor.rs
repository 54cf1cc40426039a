//! Supervisor lifecycle tests driven by scripted fake workers.
//!
//! Each test points `worker_bin` at a small shell script that plays back a
//! status stream, so the full spawn/read/reap path runs without a build
//! tool or a broker.

use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use otawake::errors::ConsoleError;
use otawake::supervisor::Supervisor;
use otawake_shared::settings::Settings;
use otawake_shared::state::UploadState;

fn fake_worker(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-worker.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn supervisor_with(worker: PathBuf, devices: &[(&str, u64)]) -> Supervisor {
    let settings = Settings {
        worker_bin: Some(worker),
        ..Default::default()
    };
    let table: BTreeMap<String, u64> = devices
        .iter()
        .map(|(name, duration)| (name.to_string(), *duration))
        .collect();
    Supervisor::new(settings, None, table)
}

async fn wait_for_state(supervisor: &Supervisor, name: &str, wanted: UploadState) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let snap = supervisor.snapshot(name).await.unwrap();
        if snap.state == wanted {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "{} never reached {:?}, stuck in {:?}",
            name,
            wanted,
            snap.state
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn states_of(supervisor: &Supervisor, name: &str) -> Vec<UploadState> {
    supervisor
        .history(name)
        .await
        .unwrap()
        .iter()
        .map(|(_, state)| *state)
        .collect()
}

#[tokio::test]
async fn test_successful_attempt_applies_states_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let worker = fake_worker(
        dir.path(),
        r#"printf '[%s,COMPILING]\n[%s,SUCCESS]\n[%s,END]\n' "$1" "$1" "$1""#,
    );
    let supervisor = supervisor_with(worker, &[("probe", 60)]);

    supervisor.start("probe").await.unwrap();
    wait_for_state(&supervisor, "probe", UploadState::End).await;

    assert_eq!(
        states_of(&supervisor, "probe").await,
        vec![
            UploadState::Starting,
            UploadState::Compiling,
            UploadState::Success,
            UploadState::End
        ]
    );
    let snap = supervisor.snapshot("probe").await.unwrap();
    assert!(snap.last_success.is_some());

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_start_is_refused_while_a_task_is_active() {
    let dir = tempfile::tempdir().unwrap();
    let worker = fake_worker(dir.path(), r#"printf '[%s,COMPILING]\n' "$1"; sleep 3"#);
    let supervisor = supervisor_with(worker, &[("probe", 60)]);

    supervisor.start("probe").await.unwrap();
    wait_for_state(&supervisor, "probe", UploadState::Compiling).await;

    assert!(matches!(
        supervisor.start("probe").await,
        Err(ConsoleError::TaskActive(_))
    ));

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_unknown_device_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let worker = fake_worker(dir.path(), "exit 0");
    let supervisor = supervisor_with(worker, &[("probe", 60)]);

    assert!(matches!(
        supervisor.start("ghost").await,
        Err(ConsoleError::UnknownDevice(_))
    ));
    assert!(matches!(
        supervisor.stop("ghost").await,
        Err(ConsoleError::UnknownDevice(_))
    ));
}

#[tokio::test]
async fn test_malformed_line_degrades_view_but_loop_survives() {
    let dir = tempfile::tempdir().unwrap();
    let worker = fake_worker(
        dir.path(),
        r#"printf 'garbage\n'; printf '[%s,END]\n' "$1""#,
    );
    let supervisor = supervisor_with(worker, &[("probe", 60)]);

    supervisor.start("probe").await.unwrap();
    wait_for_state(&supervisor, "probe", UploadState::End).await;

    assert_eq!(
        states_of(&supervisor, "probe").await,
        vec![UploadState::Starting, UploadState::Error, UploadState::End]
    );

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_foreign_device_line_forces_error() {
    let dir = tempfile::tempdir().unwrap();
    let worker = fake_worker(dir.path(), r#"printf '[other,COMPILING]\n'"#);
    let supervisor = supervisor_with(worker, &[("probe", 60)]);

    supervisor.start("probe").await.unwrap();
    wait_for_state(&supervisor, "probe", UploadState::Error).await;

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_worker_dying_without_terminal_report_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let worker = fake_worker(dir.path(), r#"printf '[%s,COMPILING]\n' "$1""#);
    let supervisor = supervisor_with(worker, &[("probe", 60)]);

    supervisor.start("probe").await.unwrap();
    wait_for_state(&supervisor, "probe", UploadState::Error).await;

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_stop_is_refused_outside_the_wake_wait() {
    let dir = tempfile::tempdir().unwrap();
    let worker = fake_worker(dir.path(), r#"printf '[%s,COMPILING]\n' "$1"; sleep 3"#);
    let supervisor = supervisor_with(worker, &[("probe", 60)]);

    assert!(matches!(
        supervisor.stop("probe").await,
        Err(ConsoleError::NoTask(_))
    ));

    supervisor.start("probe").await.unwrap();
    wait_for_state(&supervisor, "probe", UploadState::Compiling).await;

    assert!(matches!(
        supervisor.stop("probe").await,
        Err(ConsoleError::NotStoppable(_))
    ));
    let snap = supervisor.snapshot("probe").await.unwrap();
    assert_eq!(snap.state, UploadState::Compiling);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_stop_during_wake_wait_cancels_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let worker = fake_worker(
        dir.path(),
        r#"trap 'printf "[%s,CANCELLED]\n[%s,END]\n" "$1" "$1"; exit 1' INT
printf '[%s,SYNCING]\n' "$1"
sleep 30 & wait $!"#,
    );
    let supervisor = supervisor_with(worker, &[("probe", 60)]);

    supervisor.start("probe").await.unwrap();
    wait_for_state(&supervisor, "probe", UploadState::Syncing).await;

    supervisor.stop("probe").await.unwrap();
    wait_for_state(&supervisor, "probe", UploadState::End).await;

    let states = states_of(&supervisor, "probe").await;
    let cancellations = states
        .iter()
        .filter(|state| **state == UploadState::Cancelled)
        .count();
    assert_eq!(cancellations, 1);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_two_devices_progress_independently() {
    let dir = tempfile::tempdir().unwrap();
    let worker = fake_worker(
        dir.path(),
        r#"case "$1" in
flaky) printf '[flaky,COMPILING]\n[flaky,COMPILE_ERROR]\n[flaky,END]\n' ;;
steady) printf '[steady,COMPILING]\n'; sleep 1; printf '[steady,SUCCESS]\n[steady,END]\n' ;;
esac"#,
    );
    let supervisor = supervisor_with(worker, &[("flaky", 60), ("steady", 60)]);

    supervisor.start("flaky").await.unwrap();
    supervisor.start("steady").await.unwrap();

    wait_for_state(&supervisor, "flaky", UploadState::End).await;

    // The failed sibling has not disturbed the slower pipeline.
    let steady = supervisor.snapshot("steady").await.unwrap();
    assert!(matches!(
        steady.state,
        UploadState::Starting | UploadState::Compiling
    ));

    wait_for_state(&supervisor, "steady", UploadState::End).await;

    assert!(states_of(&supervisor, "flaky")
        .await
        .contains(&UploadState::CompileError));
    assert!(states_of(&supervisor, "steady")
        .await
        .contains(&UploadState::Success));

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_cancels_a_syncing_device() {
    let dir = tempfile::tempdir().unwrap();
    let worker = fake_worker(
        dir.path(),
        r#"trap 'printf "[%s,CANCELLED]\n[%s,END]\n" "$1" "$1"; exit 1' INT
printf '[%s,SYNCING]\n' "$1"
sleep 30 & wait $!"#,
    );
    let supervisor = supervisor_with(worker, &[("probe", 60)]);

    supervisor.start("probe").await.unwrap();
    wait_for_state(&supervisor, "probe", UploadState::Syncing).await;

    supervisor.shutdown().await;

    let states = states_of(&supervisor, "probe").await;
    assert!(states.contains(&UploadState::Cancelled));
    let snap = supervisor.snapshot("probe").await.unwrap();
    assert!(snap.state.is_terminal());
}

#[tokio::test]
async fn test_clear_history_keeps_current_state() {
    let dir = tempfile::tempdir().unwrap();
    let worker = fake_worker(
        dir.path(),
        r#"printf '[%s,COMPILING]\n[%s,SUCCESS]\n[%s,END]\n' "$1" "$1" "$1""#,
    );
    let supervisor = supervisor_with(worker, &[("probe", 60)]);

    supervisor.start("probe").await.unwrap();
    wait_for_state(&supervisor, "probe", UploadState::End).await;

    supervisor.clear_history("probe").await.unwrap();
    assert!(supervisor.history("probe").await.unwrap().is_empty());

    let snap = supervisor.snapshot("probe").await.unwrap();
    assert_eq!(snap.state, UploadState::End);
    assert!(snap.last_success.is_some());

    supervisor.shutdown().await;
}
