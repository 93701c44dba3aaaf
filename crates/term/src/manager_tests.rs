// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::event::TerminalEvent;

fn sh_spec(script: &str) -> SpawnSpec {
    SpawnSpec::new(
        vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()],
        "/tmp",
    )
}

async fn collect_until_exit(sub: &mut SessionSubscription) -> (String, Option<i32>) {
    let mut output = String::new();
    let mut code = None;
    while let Some(event) = sub.recv().await {
        match event {
            TerminalEvent::Stdout { chunk, .. } | TerminalEvent::Stderr { chunk, .. } => {
                output.push_str(&chunk);
            }
            TerminalEvent::Exit { code: c, .. } => {
                code = c;
                break;
            }
            _ => {}
        }
    }
    (output, code)
}

// =============================================================================
// Spawn and stream
// =============================================================================

#[tokio::test]
async fn spawn_streams_output_and_exit() {
    let manager = TerminalManager::default();
    let id = manager.spawn(sh_spec("echo streamed-$((1+1)); exit 0")).unwrap();
    let mut sub = manager.subscribe(&id).unwrap();

    let (output, code) = collect_until_exit(&mut sub).await;
    assert!(output.contains("streamed-2"), "output was: {output:?}");
    assert_eq!(code, Some(0));
}

#[tokio::test]
async fn wait_returns_exit_code() {
    let manager = TerminalManager::default();
    let id = manager.spawn(sh_spec("exit 9")).unwrap();
    assert_eq!(manager.wait(&id).await.unwrap(), 9);
}

#[tokio::test]
async fn wait_after_retirement_still_resolves() {
    let manager = TerminalManager::default();
    let id = manager.spawn(sh_spec("exit 5")).unwrap();
    assert_eq!(manager.wait(&id).await.unwrap(), 5);
    // Give the reader a moment to retire the handle, then ask again
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(manager.wait(&id).await.unwrap(), 5);
}

#[tokio::test]
async fn stdin_text_is_delivered_with_eot() {
    let manager = TerminalManager::default();
    let spec = sh_spec("read line; echo prompt-was-$line").stdin_text("NUMERUS_PLAN V1");
    let id = manager.spawn(spec).unwrap();
    let mut sub = manager.subscribe(&id).unwrap();

    let (output, code) = collect_until_exit(&mut sub).await;
    assert!(output.contains("prompt-was-NUMERUS_PLAN"), "output was: {output:?}");
    assert_eq!(code, Some(0));
}

#[tokio::test]
async fn send_writes_to_live_session() {
    let manager = TerminalManager::default();
    let id = manager.spawn(sh_spec("read line; echo sent-$line")).unwrap();
    let mut sub = manager.subscribe(&id).unwrap();

    manager.send(&id, b"abc\n").unwrap();
    let (output, _) = collect_until_exit(&mut sub).await;
    assert!(output.contains("sent-abc"), "output was: {output:?}");
}

#[tokio::test]
async fn exactly_one_exit_event_per_session() {
    let manager = TerminalManager::default();
    let id = manager.spawn(sh_spec("true")).unwrap();
    let mut sub = manager.subscribe(&id).unwrap();

    let mut exits = 0;
    while let Some(event) = sub.recv().await {
        if event.is_exit() {
            exits += 1;
        }
    }
    assert_eq!(exits, 1);
}

// =============================================================================
// Kill and terminate
// =============================================================================

#[tokio::test]
async fn kill_delivers_signal() {
    let manager = TerminalManager::default();
    let id = manager.spawn(sh_spec("sleep 30")).unwrap();
    manager.kill(&id, libc::SIGKILL).unwrap();
    assert_eq!(manager.wait(&id).await.unwrap(), 128 + libc::SIGKILL);
}

#[tokio::test]
async fn terminate_uses_sigterm_first() {
    let manager = TerminalManager::default();
    let id = manager.spawn(sh_spec("sleep 30")).unwrap();
    manager.terminate(&id, std::time::Duration::from_secs(5)).await.unwrap();
    assert_eq!(manager.wait(&id).await.unwrap(), 128 + libc::SIGTERM);
}

#[tokio::test]
async fn kill_after_exit_is_a_no_op() {
    let manager = TerminalManager::default();
    let id = manager.spawn(sh_spec("true")).unwrap();
    manager.wait(&id).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(manager.kill(&id, libc::SIGTERM).is_ok());
}

// =============================================================================
// Timeout
// =============================================================================

#[tokio::test]
async fn timeout_terminates_session() {
    let manager = TerminalManager::default();
    let mut spec = sh_spec("sleep 30");
    spec = spec.timeout(Some(std::time::Duration::from_millis(200)));
    spec.timeout_grace = std::time::Duration::from_millis(200);
    let id = manager.spawn(spec).unwrap();

    let code = manager.wait(&id).await.unwrap();
    assert!(
        code == 128 + libc::SIGTERM || code == 128 + libc::SIGKILL,
        "expected signal death, got: {code}"
    );
}

// =============================================================================
// Stats and logs
// =============================================================================

#[tokio::test]
async fn stats_track_spawns_and_exits() {
    let manager = TerminalManager::default();
    let a = manager.spawn(sh_spec("exit 0")).unwrap();
    let b = manager.spawn(sh_spec("exit 2")).unwrap();
    manager.wait(&a).await.unwrap();
    manager.wait(&b).await.unwrap();
    // Readers update stats after publishing exit
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let stats = manager.stats();
    assert_eq!(stats.spawned_total, 2);
    assert_eq!(stats.active, 0);
    assert_eq!(stats.exits_by_code.get(&0), Some(&1));
    assert_eq!(stats.exits_by_code.get(&2), Some(&1));
}

#[tokio::test]
async fn session_logs_are_mirrored() {
    let dir = tempfile::tempdir().unwrap();
    let manager = TerminalManager::default();
    let spec = sh_spec("echo mirrored").log_dir(dir.path().join("t1"));
    let id = manager.spawn(spec).unwrap();
    manager.wait(&id).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let stdout = std::fs::read_to_string(dir.path().join("t1/stdout.log")).unwrap();
    assert!(stdout.contains("mirrored"));

    let events = std::fs::read_to_string(dir.path().join("t1/events.ndjson")).unwrap();
    let lines: Vec<&str> = events.lines().collect();
    assert!(lines.iter().any(|l| l.contains("\"started\"")));
    assert!(lines.iter().any(|l| l.contains("\"exit\"")));
    // Every line is valid JSON
    for line in lines {
        serde_json::from_str::<TerminalEvent>(line).unwrap();
    }
}

// =============================================================================
// Circuit breaker integration
// =============================================================================

#[tokio::test]
async fn repeated_spawn_failures_open_the_breaker() {
    let manager = TerminalManager::new(BreakerConfig {
        threshold: 2,
        window: std::time::Duration::from_secs(60),
        cooldown: std::time::Duration::from_secs(60),
    });
    let bad = SpawnSpec::new(vec!["no-such-binary-anywhere".to_string()], "/tmp");

    assert!(matches!(manager.spawn(bad.clone()), Err(TermError::Spawn(_))));
    assert!(matches!(manager.spawn(bad.clone()), Err(TermError::Spawn(_))));
    // Breaker is now open: even a valid spawn fails fast
    assert!(matches!(manager.spawn(sh_spec("true")), Err(TermError::SpawnCircuitOpen)));
}

#[tokio::test]
async fn unknown_session_is_an_error() {
    let manager = TerminalManager::default();
    let ghost = SessionId::new();
    assert!(matches!(manager.subscribe(&ghost), Err(TermError::UnknownSession(_))));
    assert!(matches!(manager.send(&ghost, b"x"), Err(TermError::UnknownSession(_))));
}
