//! Integration tests for the participant registry and the call facade.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use call_session::participants::{Participant, ParticipantsReceiver};
use call_session::transport::ParticipantRecord;
use call_session::{CallSession, SessionState};
use session_test_utils::*;

const WAIT_LIMIT: Duration = Duration::from_secs(30);

async fn wait_for_snapshot(
    participants: &mut ParticipantsReceiver,
    predicate: impl FnMut(&Vec<Participant>) -> bool,
) -> Vec<Participant> {
    tokio::time::timeout(WAIT_LIMIT, participants.wait_for(predicate))
        .await
        .expect("timed out waiting for participants")
        .expect("participants channel closed")
        .clone()
}

fn start(transport: &Arc<MockTransport>) -> CallSession {
    CallSession::start(
        &test_session_config(),
        transport.clone(),
        MockCredentialRefresher::succeeding(),
    )
}

fn identities(snapshot: &[Participant]) -> Vec<&str> {
    snapshot.iter().map(|p| p.identity.as_str()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_empty_until_connected() {
    let transport = MockTransport::new()
        .with_local_participant(local_record("me", "Me"))
        .with_remote_participants(vec![remote_record("bo", "Bo")]);
    let call = start(&transport);

    assert!(call.snapshot().is_empty());

    let mut participants = call.participants();
    call.connect(test_credentials()).await.unwrap();
    let snapshot = wait_for_snapshot(&mut participants, |p| p.len() == 2).await;

    assert_eq!(identities(&snapshot), vec!["me", "bo"]);
    let me = snapshot.first().unwrap();
    assert!(me.is_local);
    assert_eq!(me.display_name, "Me");
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_follows_joins_leaves_and_metadata() {
    let transport = MockTransport::new()
        .with_local_participant(local_record("me", "Me"))
        .with_remote_participants(vec![remote_record("bo", "Bo")]);
    let call = start(&transport);
    let mut participants = call.participants();
    call.connect(test_credentials()).await.unwrap();
    wait_for_snapshot(&mut participants, |p| p.len() == 2).await;

    transport.add_remote(remote_record("cy", "Cy"));
    let snapshot = wait_for_snapshot(&mut participants, |p| p.len() == 3).await;
    assert_eq!(identities(&snapshot), vec!["me", "bo", "cy"]);

    transport.update_remote_metadata(
        "bo",
        r#"{"displayName":"Bo Renamed","profileImageUrl":"https://img.example/bo.png"}"#,
    );
    let snapshot = wait_for_snapshot(&mut participants, |p| {
        p.iter().any(|x| x.display_name == "Bo Renamed")
    })
    .await;
    let bo = snapshot.iter().find(|p| p.identity.as_str() == "bo").unwrap();
    assert_eq!(
        bo.profile_image_url.as_deref(),
        Some("https://img.example/bo.png")
    );

    transport.remove_remote("cy");
    let snapshot = wait_for_snapshot(&mut participants, |p| p.len() == 2).await;
    assert_eq!(identities(&snapshot), vec!["me", "bo"]);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_metadata_degrades_to_anonymous() {
    let transport = MockTransport::new()
        .with_local_participant(local_record("me", "Me"))
        .with_remote_participants(vec![
            ParticipantRecord::new("ghost").with_metadata("{not json"),
            ParticipantRecord::new("quiet"),
        ]);
    let call = start(&transport);
    let mut participants = call.participants();
    call.connect(test_credentials()).await.unwrap();

    let snapshot = wait_for_snapshot(&mut participants, |p| p.len() == 3).await;
    let ghost = snapshot.iter().find(|p| p.identity.as_str() == "ghost").unwrap();
    assert_eq!(ghost.display_name, "ghost");
    assert!(ghost.is_anonymous());

    let quiet = snapshot.iter().find(|p| p.identity.as_str() == "quiet").unwrap();
    assert!(quiet.is_anonymous());
    assert_eq!(call.session().state(), SessionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_cleared_on_leave() {
    let transport = MockTransport::new()
        .with_local_participant(local_record("me", "Me"))
        .with_remote_participants(vec![remote_record("bo", "Bo")]);
    let call = start(&transport);
    let mut participants = call.participants();
    call.connect(test_credentials()).await.unwrap();
    wait_for_snapshot(&mut participants, |p| p.len() == 2).await;

    call.leave().await;
    wait_for_snapshot(&mut participants, Vec::is_empty).await;
    assert_eq!(call.session().state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_kept_while_recovering() {
    let transport = MockTransport::new()
        .with_local_participant(local_record("me", "Me"))
        .with_remote_participants(vec![remote_record("bo", "Bo")]);
    let call = CallSession::start(
        &test_session_config(),
        transport.clone(),
        MockCredentialRefresher::failing(),
    );
    let mut participants = call.participants();
    call.connect(test_credentials()).await.unwrap();
    wait_for_snapshot(&mut participants, |p| p.len() == 2).await;

    transport.drop_connection("network lost");
    call.session()
        .wait_for(|s| s.state == SessionState::Reconnecting)
        .await
        .unwrap();
    transport.add_remote(remote_record("cy", "Cy"));
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(identities(&call.snapshot()), vec!["me", "bo"]);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_all_actors() {
    let transport = MockTransport::new().with_local_participant(local_record("me", "Me"));
    let call = start(&transport);
    let session = call.session().clone();
    call.connect(test_credentials()).await.unwrap();
    session
        .wait_for(|s| s.state == SessionState::Connected)
        .await
        .unwrap();

    tokio::time::timeout(WAIT_LIMIT, call.shutdown())
        .await
        .expect("shutdown did not complete");

    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(transport.disconnect_calls(), 1);
    assert!(session.is_cancelled());
}
