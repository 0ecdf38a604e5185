//! Tests for the advisory lock primitive.

use super::*;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn acquire_succeeds_on_fresh_file() {
    let dir = TempDir::new().unwrap();
    let mut lock = AdvisoryLock::new(dir.path().join("a.lock"));

    assert!(lock.acquire().is_success());
    assert!(lock.is_held());
    assert!(lock.path().exists());
}

#[test]
fn second_handle_in_same_process_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.lock");
    let mut first = AdvisoryLock::new(path.clone());
    let mut second = AdvisoryLock::new(path);

    assert!(first.acquire().is_success());
    match second.acquire() {
        LockOutcome::AlreadyHeld(reason) => assert!(reason.contains("a.lock")),
        other => panic!("expected AlreadyHeld, got {other:?}"),
    }
    assert!(!second.is_held());
}

#[test]
fn release_makes_the_lock_available_again() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.lock");
    let mut first = AdvisoryLock::new(path.clone());
    let mut second = AdvisoryLock::new(path);

    assert!(first.acquire().is_success());
    first.release();
    assert!(!first.is_held());

    assert!(second.acquire().is_success());
}

#[test]
fn same_instance_can_cycle_repeatedly() {
    let dir = TempDir::new().unwrap();
    let mut lock = AdvisoryLock::new(dir.path().join("a.lock"));

    for _ in 0..3 {
        assert!(lock.acquire().is_success());
        lock.release();
    }
}

#[test]
fn release_when_not_held_is_a_noop() {
    let dir = TempDir::new().unwrap();
    let mut lock = AdvisoryLock::new(dir.path().join("a.lock"));
    lock.release();
    assert!(!lock.is_held());
}

#[test]
fn acquire_creates_missing_parent_directories() {
    let dir = TempDir::new().unwrap();
    let mut lock = AdvisoryLock::new(dir.path().join("deep").join("nested").join("a.lock"));

    assert!(lock.acquire().is_success());
    assert!(lock.path().exists());
}

#[cfg(unix)]
#[test]
fn acquire_reports_cannot_create_for_invalid_path() {
    // /dev/null is a file, so creating a directory under it must fail.
    let mut lock = AdvisoryLock::new("/dev/null/applock/a.lock".into());

    match lock.acquire() {
        LockOutcome::CannotCreate(_) => {}
        other => panic!("expected CannotCreate, got {other:?}"),
    }
}

#[test]
fn retry_until_acquired_waits_out_a_brief_holder() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.lock");
    let mut holder = AdvisoryLock::new(path.clone());
    assert!(holder.acquire().is_success());

    let mut waiter = AdvisoryLock::new(path);
    let waiter = thread::spawn(move || {
        let outcome = waiter.retry_until_acquired();
        (outcome.is_success(), waiter)
    });

    thread::sleep(Duration::from_millis(50));
    holder.release();

    let (acquired, waiter) = waiter.join().unwrap();
    assert!(acquired);
    assert!(waiter.is_held());
}

#[test]
fn drop_releases_the_lock() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.lock");

    {
        let mut held = AdvisoryLock::new(path.clone());
        assert!(held.acquire().is_success());
    }

    let mut second = AdvisoryLock::new(path);
    assert!(second.acquire().is_success());
}
