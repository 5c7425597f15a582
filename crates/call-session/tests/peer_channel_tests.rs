//! Integration tests for chat and live captions.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use call_session::captions::CaptionEntry;
use call_session::chat::ChatMessage;
use call_session::transport::TransportEvent;
use call_session::{CallSession, SessionConfig, SessionError, SessionState};
use common::types::ParticipantIdentity;
use session_protocol::{DeliveryClass, MessageEnvelope, MAX_ENVELOPE_BYTES};
use session_test_utils::*;
use tokio::sync::{broadcast, watch};

const WAIT_LIMIT: Duration = Duration::from_secs(30);

async fn connected_call(transport: &Arc<MockTransport>) -> CallSession {
    connected_call_with(&test_session_config(), transport).await
}

async fn connected_call_with(
    config: &SessionConfig,
    transport: &Arc<MockTransport>,
) -> CallSession {
    let call = CallSession::start(
        config,
        transport.clone(),
        MockCredentialRefresher::succeeding(),
    );
    call.connect(test_credentials()).await.unwrap();
    tokio::time::timeout(
        WAIT_LIMIT,
        call.session().wait_for(|s| s.state == SessionState::Connected),
    )
    .await
    .unwrap()
    .unwrap();
    call
}

fn default_transport() -> Arc<MockTransport> {
    MockTransport::new()
        .with_local_participant(local_record("me", "Me"))
        .with_remote_participants(vec![remote_record("bo", "Bo"), remote_record("cy", "Cy")])
}

async fn wait_for_captions(
    captions: &mut watch::Receiver<Vec<CaptionEntry>>,
    predicate: impl FnMut(&Vec<CaptionEntry>) -> bool,
) -> Vec<CaptionEntry> {
    tokio::time::timeout(WAIT_LIMIT, captions.wait_for(predicate))
        .await
        .expect("timed out waiting for captions")
        .expect("captions channel closed")
        .clone()
}

async fn next_chat(chat: &mut broadcast::Receiver<ChatMessage>) -> ChatMessage {
    tokio::time::timeout(WAIT_LIMIT, chat.recv())
        .await
        .expect("timed out waiting for chat")
        .expect("chat channel closed")
}

fn caption(speaker: &str, name: &str, text: &str, is_final: bool) -> MessageEnvelope {
    MessageEnvelope::caption(text, ParticipantIdentity::new(speaker), name, is_final)
}

// ============================================================================
// Captions
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_two_concurrent_speakers_stay_independent() {
    let transport = default_transport();
    let call = connected_call(&transport).await;
    let peer = call.peer_channel();
    peer.set_captions_enabled(true).await.unwrap();
    let mut captions = peer.subscribe_captions();

    transport.deliver("bo", &caption("bo", "Bo", "so the plan", false));
    transport.deliver("cy", &caption("cy", "Cy", "I think", false));
    transport.deliver("bo", &caption("bo", "Bo", "so the plan is", false));
    transport.deliver("cy", &caption("cy", "Cy", "I think we should", false));

    // Fragments are applied in delivery order, so the last one marks completion
    let entries = wait_for_captions(&mut captions, |entries| {
        entries.iter().any(|e| e.text == "I think we should")
    })
    .await;
    assert_eq!(entries.len(), 2);

    let bo = entries
        .iter()
        .find(|e| e.speaker_id.as_str() == "bo")
        .unwrap();
    let cy = entries
        .iter()
        .find(|e| e.speaker_id.as_str() == "cy")
        .unwrap();

    assert_eq!(bo.text, "so the plan is");
    assert_eq!(bo.speaker_name, "Bo");
    assert_eq!(cy.text, "I think we should");
    assert_eq!(cy.speaker_name, "Cy");
}

#[tokio::test(start_paused = true)]
async fn test_final_caption_expires_after_delay() {
    let transport = default_transport();
    let call = connected_call(&transport).await;
    let peer = call.peer_channel();
    peer.set_captions_enabled(true).await.unwrap();
    let mut captions = peer.subscribe_captions();

    transport.deliver("bo", &caption("bo", "Bo", "that's all", true));
    wait_for_captions(&mut captions, |entries| entries.len() == 1).await;

    tokio::time::sleep(Duration::from_millis(450)).await;
    assert_eq!(peer.captions().await.unwrap().len(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(peer.captions().await.unwrap().is_empty());

    // The published view clears at the same deadline
    wait_for_captions(&mut captions, Vec::is_empty).await;

    let transcript = peer.transcript().await.unwrap();
    assert_eq!(transcript.len(), 1);
    let line = transcript.first().unwrap();
    assert_eq!(line.speaker_id.as_str(), "bo");
    assert_eq!(line.text, "that's all");
}

#[tokio::test(start_paused = true)]
async fn test_caption_view_clears_at_exact_expiry() {
    let config = SessionConfig {
        caption_expiry: Duration::from_millis(600),
        ..test_session_config()
    };
    let transport = default_transport();
    let call = connected_call_with(&config, &transport).await;
    let peer = call.peer_channel();
    peer.set_captions_enabled(true).await.unwrap();
    let mut captions = peer.subscribe_captions();

    tokio::time::sleep(Duration::from_millis(260)).await;
    transport.deliver("bo", &caption("bo", "Bo", "see you", true));
    wait_for_captions(&mut captions, |entries| entries.len() == 1).await;

    tokio::time::sleep(Duration::from_millis(599)).await;
    assert_eq!(captions.borrow().len(), 1);

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert!(captions.borrow().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_local_captions_display_and_broadcast() {
    let transport = default_transport();
    let call = connected_call(&transport).await;
    let peer = call.peer_channel();
    peer.set_captions_enabled(true).await.unwrap();

    peer.publish_caption("good mor", false).await.unwrap();

    let entries = peer.captions().await.unwrap();
    let local = entries.first().unwrap();
    assert_eq!(local.speaker_id.as_str(), "me");
    assert_eq!(local.speaker_name, "Me");
    assert_eq!(local.text, "good mor");

    peer.publish_caption("good morning", true).await.unwrap();

    assert_eq!(
        transport.published_envelopes(),
        vec![
            (
                caption("me", "Me", "good mor", false),
                DeliveryClass::BestEffort
            ),
            (
                caption("me", "Me", "good morning", true),
                DeliveryClass::Reliable
            ),
        ]
    );

    let transcript = peer.transcript().await.unwrap();
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript.first().unwrap().text, "good morning");
}

#[tokio::test(start_paused = true)]
async fn test_captions_disabled_by_default() {
    let transport = default_transport();
    let call = connected_call(&transport).await;
    let peer = call.peer_channel();
    let mut chat = peer.subscribe_chat();

    assert!(matches!(
        peer.publish_caption("hello", true).await,
        Err(SessionError::CaptionsDisabled)
    ));

    // Chat after the caption acts as a barrier: events are handled in order
    transport.deliver("bo", &caption("bo", "Bo", "ignored", true));
    transport.deliver("bo", &MessageEnvelope::chat("barrier"));
    next_chat(&mut chat).await;

    assert!(peer.captions().await.unwrap().is_empty());
    assert!(peer.transcript().await.unwrap().is_empty());
    assert!(transport.published().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_disabling_captions_clears_entries_keeps_transcript() {
    let transport = default_transport();
    let call = connected_call(&transport).await;
    let peer = call.peer_channel();
    peer.set_captions_enabled(true).await.unwrap();
    let mut captions = peer.subscribe_captions();

    transport.deliver("bo", &caption("bo", "Bo", "done", true));
    transport.deliver("cy", &caption("cy", "Cy", "still talk", false));
    wait_for_captions(&mut captions, |entries| entries.len() == 2).await;

    peer.set_captions_enabled(false).await.unwrap();

    assert!(peer.captions().await.unwrap().is_empty());
    assert_eq!(peer.transcript().await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_oversized_local_caption_is_rejected() {
    let transport = default_transport();
    let call = connected_call(&transport).await;
    let peer = call.peer_channel();
    peer.set_captions_enabled(true).await.unwrap();

    let result = peer
        .publish_caption("x".repeat(MAX_ENVELOPE_BYTES), true)
        .await;

    assert!(matches!(result, Err(SessionError::InvalidInput(_))));
    assert!(transport.published().is_empty());
    assert!(peer.captions().await.unwrap().is_empty());
    assert!(peer.transcript().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_caption_broadcast_records_nothing() {
    let transport = default_transport();
    let call = CallSession::start(
        &test_session_config(),
        transport.clone(),
        MockCredentialRefresher::failing(),
    );
    call.connect(test_credentials()).await.unwrap();
    let session = call.session();
    tokio::time::timeout(
        WAIT_LIMIT,
        session.wait_for(|s| s.state == SessionState::Connected),
    )
    .await
    .unwrap()
    .unwrap();

    let peer = call.peer_channel();
    peer.set_captions_enabled(true).await.unwrap();

    // The session gives up the connection while the transport still lists
    // the local participant
    transport.emit(TransportEvent::Disconnected {
        reason: "network lost".to_string(),
    });
    tokio::time::timeout(
        WAIT_LIMIT,
        session.wait_for(|s| s.state != SessionState::Connected),
    )
    .await
    .unwrap()
    .unwrap();

    let result = peer.publish_caption("lost words", true).await;

    assert!(matches!(result, Err(SessionError::NotConnected)));
    assert!(peer.captions().await.unwrap().is_empty());
    assert!(peer.transcript().await.unwrap().is_empty());
}

// ============================================================================
// Chat
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_send_chat_publishes_reliably_and_records() {
    let transport = default_transport();
    let call = connected_call(&transport).await;
    let peer = call.peer_channel();

    let sent = peer.send_chat("hello everyone").await.unwrap();
    assert!(sent.is_local);
    assert_eq!(sent.sender.as_str(), "me");
    assert_eq!(sent.sender_name, "Me");

    assert_eq!(
        transport.published_envelopes(),
        vec![(
            MessageEnvelope::chat("hello everyone"),
            DeliveryClass::Reliable
        )]
    );
    assert_eq!(peer.chat_history().await.unwrap(), vec![sent]);
}

#[tokio::test(start_paused = true)]
async fn test_send_chat_rejects_blank_text() {
    let transport = default_transport();
    let call = connected_call(&transport).await;

    let result = call.peer_channel().send_chat("   ").await;
    assert!(matches!(result, Err(SessionError::InvalidInput(_))));
    assert!(transport.published().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_send_chat_requires_connection() {
    let transport = default_transport();
    let call = CallSession::start(
        &test_session_config(),
        transport.clone(),
        MockCredentialRefresher::succeeding(),
    );

    let result = call.peer_channel().send_chat("anyone?").await;
    assert!(matches!(result, Err(SessionError::NotConnected)));
    assert!(call.peer_channel().chat_history().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_remote_chat_resolves_sender_name() {
    let transport = default_transport();
    let call = connected_call(&transport).await;
    let mut chat = call.peer_channel().subscribe_chat();

    transport.deliver("bo", &MessageEnvelope::chat("hi from bo"));
    transport.deliver("stranger", &MessageEnvelope::chat("who am i"));

    let first = next_chat(&mut chat).await;
    assert_eq!(first.sender_name, "Bo");
    assert_eq!(first.text, "hi from bo");
    assert!(!first.is_local);

    let second = next_chat(&mut chat).await;
    assert_eq!(second.sender_name, "stranger");
}

#[tokio::test(start_paused = true)]
async fn test_malformed_payloads_are_dropped() {
    let transport = default_transport();
    let call = connected_call(&transport).await;
    let mut chat = call.peer_channel().subscribe_chat();

    transport.deliver_raw("bo", &b"\x00\x01 not json"[..]);
    transport.deliver_raw("bo", &br#"{"type":"reaction","emoji":"+1"}"#[..]);
    transport.deliver_raw("bo", &br#"{"type":"subtitle","text":"no speaker"}"#[..]);
    transport.deliver_raw("bo", &b""[..]);
    transport.deliver("bo", &MessageEnvelope::chat("still here"));

    let message = next_chat(&mut chat).await;
    assert_eq!(message.text, "still here");

    assert_eq!(call.session().state(), SessionState::Connected);
    assert_eq!(call.peer_channel().chat_history().await.unwrap().len(), 1);
}
