//! End-to-end session flows against the mock transport.

use beep_pager_client::{
    MockTransport, SessionConfig, SessionError, SessionManager, SessionPhase,
};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

async fn next_command(transport: &MockTransport) -> Value {
    let frame = timeout(WAIT, transport.next_sent())
        .await
        .expect("no frame sent")
        .expect("sent stream closed");
    serde_json::from_slice(&frame).expect("sent frame is not JSON")
}

async fn wait_for(session: &SessionManager, phase: SessionPhase) {
    let mut phases = session.watch_phase();
    timeout(WAIT, phases.wait_for(|current| *current == phase))
        .await
        .expect("phase not reached")
        .expect("session gone");
}

#[tokio::test]
async fn login_then_sync_until_caught_up() {
    let transport = MockTransport::new();
    let session = SessionManager::spawn(SessionConfig::default(), transport.clone());

    let signing_in = {
        let session = session.clone();
        tokio::spawn(async move { session.sign_in("alice", "s3cret").await })
    };

    assert_eq!(
        next_command(&transport).await,
        json!({"cmd": "login", "user_token": "alice", "device_token": "", "secret_key": "s3cret"})
    );
    transport.push_frame(br#"{"event":"logged_in"}"#.to_vec());

    timeout(WAIT, signing_in).await.unwrap().unwrap().unwrap();
    assert_eq!(session.phase(), SessionPhase::SignedIn);
    assert_eq!(
        next_command(&transport).await,
        json!({"cmd": "sync", "device_pts": 0})
    );

    transport.push_frame(
        br#"{"event":"sync_updates","too_long":false,"synced":false,"updates":[{"pts":3,"kind":"message"}]}"#
            .to_vec(),
    );
    assert_eq!(
        next_command(&transport).await,
        json!({"cmd": "sync", "device_pts": 0})
    );

    transport.push_frame(
        br#"{"event":"sync_updates","too_long":false,"synced":true,"updates":[]}"#.to_vec(),
    );
    let more = timeout(Duration::from_millis(100), transport.next_sent()).await;
    assert!(more.is_err(), "sync loop should stop once synced");
    assert_eq!(session.phase(), SessionPhase::SignedIn);
}

#[tokio::test]
async fn concurrent_sign_ins_share_one_connection() {
    let transport = MockTransport::new();
    transport.hold_connect();
    let session = SessionManager::spawn(SessionConfig::default(), transport.clone());

    let callers: Vec<_> = (0..3)
        .map(|_| {
            let session = session.clone();
            tokio::spawn(async move { session.sign_in("alice", "s3cret").await })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(20)).await;
    transport.release_connect();

    next_command(&transport).await;
    transport.push_frame(br#"{"event":"logged_in"}"#.to_vec());

    for caller in callers {
        timeout(WAIT, caller).await.unwrap().unwrap().unwrap();
    }
    assert_eq!(transport.connect_attempts(), 1);
}

#[tokio::test]
async fn concurrent_sign_ins_fail_together() {
    let transport = MockTransport::new();
    transport.hold_connect();
    transport.fail_next_connect("refused");
    let session = SessionManager::spawn(SessionConfig::default(), transport.clone());

    let callers: Vec<_> = (0..2)
        .map(|_| {
            let session = session.clone();
            tokio::spawn(async move { session.sign_in("alice", "s3cret").await })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(20)).await;
    transport.release_connect();

    for caller in callers {
        let result = timeout(WAIT, caller).await.unwrap().unwrap();
        assert_eq!(result, Err(SessionError::ConnectionLost));
    }
    assert_eq!(transport.connect_attempts(), 1);
}

#[tokio::test]
async fn malformed_login_reply_tears_down_and_rejects() {
    let transport = MockTransport::new();
    let session = SessionManager::spawn(SessionConfig::default(), transport.clone());
    let signing_in = {
        let session = session.clone();
        tokio::spawn(async move { session.sign_in("alice", "s3cret").await })
    };
    next_command(&transport).await;
    transport.push_frame(br#"{"event":"logged_in""#.to_vec());

    let result = timeout(WAIT, signing_in).await.unwrap().unwrap();
    assert_eq!(result, Err(SessionError::ConnectionLost));
    wait_for(&session, SessionPhase::Idle).await;
    assert_eq!(transport.connect_attempts(), 1);
}

#[tokio::test]
async fn frames_after_teardown_are_ignored() {
    let transport = MockTransport::new();
    let session = SessionManager::spawn(SessionConfig::default(), transport.clone());

    let signing_in = {
        let session = session.clone();
        tokio::spawn(async move { session.sign_in("alice", "s3cret").await })
    };
    next_command(&transport).await;
    transport.push_frame(b"garbage".to_vec());
    transport.push_frame(br#"{"event":"logged_in"}"#.to_vec());

    let result = timeout(WAIT, signing_in).await.unwrap().unwrap();
    assert_eq!(result, Err(SessionError::ConnectionLost));
    wait_for(&session, SessionPhase::Idle).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(session.phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn server_close_after_sign_in_goes_idle_and_allows_retry() {
    let transport = MockTransport::new();
    let session = SessionManager::spawn(SessionConfig::default(), transport.clone());

    let first = {
        let session = session.clone();
        tokio::spawn(async move { session.sign_in("alice", "s3cret").await })
    };
    next_command(&transport).await;
    transport.push_frame(br#"{"event":"logged_in"}"#.to_vec());
    timeout(WAIT, first).await.unwrap().unwrap().unwrap();
    next_command(&transport).await;

    transport.close_remote();
    wait_for(&session, SessionPhase::Idle).await;
    assert_eq!(
        session.send_message("bob", "hi").await,
        Err(SessionError::NotSignedIn)
    );

    let second = {
        let session = session.clone();
        tokio::spawn(async move { session.sign_in("alice", "s3cret").await })
    };
    assert_eq!(next_command(&transport).await["cmd"], "login");
    transport.push_frame(br#"{"event":"logged_in"}"#.to_vec());
    timeout(WAIT, second).await.unwrap().unwrap().unwrap();
    assert_eq!(transport.connect_attempts(), 2);
}

#[tokio::test]
async fn sign_in_deadline_does_not_cancel_the_attempt() {
    let transport = MockTransport::new();
    transport.hold_connect();
    let config = SessionConfig::default().with_sign_in_timeout(Duration::from_secs(0));
    let session = SessionManager::spawn(config, transport.clone());

    let result = session.sign_in("alice", "s3cret").await;
    assert_eq!(result, Err(SessionError::Timeout));

    transport.release_connect();
    wait_for(&session, SessionPhase::SigningIn).await;
    assert_eq!(next_command(&transport).await["cmd"], "login");
}
