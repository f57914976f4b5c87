use super::*;
use std::sync::{Arc, Mutex};

use tokio::task::yield_now;

async fn remote_step(log: Arc<Mutex<Vec<(u64, &'static str)>>>, token: u64, what: &'static str) -> Result<(), SyncError> {
    yield_now().await;
    log.lock().expect("log").push((token, what));
    Ok(())
}

async fn guarded_write(
    guard: &RaceGuard,
    log: Arc<Mutex<Vec<(u64, &'static str)>>>,
) -> Result<u64, GuardedError> {
    let token = guard.begin();
    token.step(remote_step(Arc::clone(&log), token.token(), "read")).await?;
    token.step(remote_step(Arc::clone(&log), token.token(), "write")).await?;
    token.ensure_current()?;
    log.lock().expect("log").push((token.token(), "complete"));
    Ok(token.token())
}

#[test]
fn tokens_are_monotonic_and_only_the_latest_is_current() {
    let guard = RaceGuard::new();
    let first = guard.begin();
    assert!(first.is_current());
    let second = guard.begin();
    assert!(second.token() > first.token());
    assert!(!first.is_current());
    assert!(second.is_current());
    assert_eq!(guard.current(), second.token());
    assert_eq!(
        first.ensure_current(),
        Err(StaleOperationAbort {
            token: first.token(),
            current: second.token(),
        })
    );
}

#[tokio::test]
async fn superseded_writes_stop_at_the_next_check() {
    let guard = RaceGuard::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let (a, b, c) = tokio::join!(
        guarded_write(&guard, Arc::clone(&log)),
        guarded_write(&guard, Arc::clone(&log)),
        guarded_write(&guard, Arc::clone(&log)),
    );

    assert!(matches!(a, Err(GuardedError::Stale(_))));
    assert!(matches!(b, Err(GuardedError::Stale(_))));
    let winner = c.expect("latest write completes");

    let log = log.lock().expect("log").clone();
    let completed: Vec<u64> = log
        .iter()
        .filter(|(_, what)| *what == "complete")
        .map(|(token, _)| *token)
        .collect();
    assert_eq!(completed, vec![winner]);
    assert!(log
        .iter()
        .filter(|(_, what)| *what == "write")
        .all(|(token, _)| *token == winner));
}

#[tokio::test]
async fn step_refuses_to_start_once_superseded() {
    let guard = RaceGuard::new();
    let stale = guard.begin();
    let _newer = guard.begin();
    let mut ran = false;

    let result = stale
        .step(async {
            ran = true;
            Ok::<_, SyncError>(())
        })
        .await;

    assert!(matches!(result, Err(GuardedError::Stale(_))));
    assert!(!ran);
}

#[test]
fn settle_hides_stale_aborts_but_keeps_failures() {
    let stale = GuardedError::Stale(StaleOperationAbort {
        token: 1,
        current: 2,
    });
    assert!(settle("gallerysize", Err(stale)).is_ok());

    let failed = GuardedError::from(RemoteCallError::Disconnected);
    let err = settle("gallerysize", Err(failed)).expect_err("failure propagates");
    assert!(matches!(err, SyncError::Remote(RemoteCallError::Disconnected)));
}
