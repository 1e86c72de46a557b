mod support;

use chrono::Utc;
use pretty_assertions::assert_eq;
use std::time::Duration;
use support::{id, test_config, Harness};
use vanish_relay::{Conversation, MessageBody, RelayError, VanishConfig, UNREADABLE_MARKER};
use vanish_types::{MessageEnvelope, SealedPayload};
use vanish_vault::{Directory, VaultError};

#[tokio::test]
async fn alice_to_bob_with_short_ttl_vanishes() {
    let harness = Harness::with_config(VanishConfig {
        ttl_seconds: 2,
        ..test_config()
    });
    let alice = harness.started_session("alice").await;
    let bob = harness.started_session("bob").await;

    let sent = alice.send_text(&id("bob"), "hello").await.unwrap();
    assert_eq!(sent.ttl(), chrono::Duration::seconds(2));

    let rendered = bob.read(&sent).await.unwrap();
    assert_eq!(rendered.body, MessageBody::Text("hello".into()));
    assert_eq!(rendered.sender, id("alice"));

    let channel = harness.channel();
    assert_eq!(channel.history(&id("alice"), &id("bob")).await.unwrap().len(), 1);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(channel.history(&id("alice"), &id("bob")).await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_recipient_is_reported() {
    let harness = Harness::new();
    let alice = harness.started_session("alice").await;

    let err = alice.send_text(&id("carol"), "anyone?").await.unwrap_err();
    assert!(matches!(err, RelayError::RecipientUnknown(ref who) if who == &id("carol")));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn corrupted_directory_key_is_an_encryption_error() {
    let harness = Harness::new();
    let alice = harness.started_session("alice").await;
    harness
        .directory
        .set_public_key(&id("mallory"), b"truncated-key")
        .await
        .unwrap();

    let err = alice.send_text(&id("mallory"), "hi").await.unwrap_err();
    assert!(
        matches!(err, RelayError::Crypto(vanish_crypto::CryptoError::Encryption(_))),
        "got {err:?}"
    );
}

#[tokio::test]
async fn tampered_envelope_renders_unreadable_marker() {
    let harness = Harness::new();
    let alice = harness.started_session("alice").await;
    let bob = harness.started_session("bob").await;

    let sealed = alice.seal_text(&id("bob"), "secret").await.unwrap();
    let mut payload = sealed.payload().clone();
    payload.ciphertext[0] ^= 0x01;
    let tampered = MessageEnvelope::from_parts(
        sealed.sender().clone(),
        sealed.receiver().clone(),
        payload,
        sealed.created_at(),
        sealed.expires_at(),
    )
    .unwrap();

    let rendered = bob.read(&tampered).await.unwrap();
    assert_eq!(rendered.body, MessageBody::Unreadable);
    assert_eq!(rendered.body.to_string(), UNREADABLE_MARKER);
    assert!(!rendered.is_readable());
}

#[tokio::test]
async fn invalid_utf8_renders_unreadable() {
    let harness = Harness::new();
    let _alice = harness.started_session("alice").await;
    let bob = harness.started_session("bob").await;

    let der = harness.directory.get_public_key(&id("bob")).await.unwrap();
    let sealed = vanish_crypto::seal(&[0xff, 0xfe, 0xfd], &der).unwrap();
    let envelope = MessageEnvelope::new(
        id("alice"),
        id("bob"),
        sealed,
        Utc::now(),
        chrono::Duration::seconds(60),
    )
    .unwrap();

    assert_eq!(bob.read(&envelope).await.unwrap().body, MessageBody::Unreadable);
}

#[tokio::test]
async fn one_bad_envelope_does_not_break_the_view() {
    let harness = Harness::new();
    let alice = harness.started_session("alice").await;
    let bob = harness.started_session("bob").await;

    let good = alice.send_text(&id("bob"), "fine").await.unwrap();
    let garbage = MessageEnvelope::new(
        id("alice"),
        id("bob"),
        SealedPayload {
            ciphertext: vec![1, 2, 3],
            wrapped_key: vec![4; 104],
            nonce: [5; 12],
        },
        Utc::now(),
        chrono::Duration::seconds(60),
    )
    .unwrap();

    let rendered = bob.read_all(&[good, garbage]).await.unwrap();
    let bodies: Vec<String> = rendered.iter().map(|m| m.body.to_string()).collect();
    assert_eq!(bodies, vec!["fine".to_string(), UNREADABLE_MARKER.to_string()]);
}

#[tokio::test]
async fn sender_sees_own_text() {
    let harness = Harness::new();
    let alice = harness.started_session("alice").await;
    let _bob = harness.started_session("bob").await;

    let sent = alice.send_text(&id("bob"), "note to bob").await.unwrap();
    let rendered = alice.read(&sent).await.unwrap();
    assert_eq!(rendered.body, MessageBody::Text("note to bob".into()));
}

#[tokio::test]
async fn third_party_cannot_read() {
    let harness = Harness::new();
    let alice = harness.started_session("alice").await;
    let _bob = harness.started_session("bob").await;
    let eve = harness.started_session("eve").await;

    let sent = alice.send_text(&id("bob"), "not for eve").await.unwrap();
    assert_eq!(eve.read(&sent).await.unwrap().body, MessageBody::Unreadable);
}

#[tokio::test]
async fn reading_without_local_key_asks_for_provisioning() {
    let harness = Harness::new();
    let alice = harness.started_session("alice").await;
    let _bob = harness.started_session("bob").await;
    let sent = alice.send_text(&id("bob"), "hi").await.unwrap();

    // A fresh device for bob that never ran `start`.
    let new_device = harness.session("bob");
    let err = new_device.read(&sent).await.unwrap_err();
    assert!(
        matches!(err, RelayError::Vault(VaultError::NoLocalKey(_))),
        "got {err:?}"
    );
}

#[tokio::test]
async fn start_is_idempotent_and_publishes_once() {
    let harness = Harness::new();
    let alice = harness.session("alice");
    alice.start().await.unwrap();
    let first = harness.directory.get_public_key(&id("alice")).await.unwrap();
    alice.start().await.unwrap();
    let second = harness.directory.get_public_key(&id("alice")).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn opening_twice_yields_same_text() {
    let harness = Harness::new();
    let alice = harness.started_session("alice").await;
    let bob = harness.started_session("bob").await;

    let sent = alice.send_text(&id("bob"), "twice").await.unwrap();
    let a = bob.read(&sent).await.unwrap();
    let b = bob.read(&sent).await.unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn conversation_forgets_vanished_messages() {
    let harness = Harness::with_config(VanishConfig {
        ttl_seconds: 1,
        ..test_config()
    });
    let alice = harness.started_session("alice").await;
    let bob = harness.started_session("bob").await;
    alice.send_text(&id("bob"), "brief").await.unwrap();

    let mut conversation = Conversation::new(id("bob"), id("alice"));
    let report = bob
        .channel()
        .reconcile(&id("bob"), &id("alice"), |_| {})
        .await
        .unwrap();
    assert_eq!(bob.ingest_snapshot(&mut conversation, &report).await.unwrap(), 1);
    assert_eq!(conversation.len(), 1);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let report = bob
        .channel()
        .reconcile(&id("bob"), &id("alice"), |_| {})
        .await
        .unwrap();
    assert!(report.is_empty());
    assert_eq!(bob.ingest_snapshot(&mut conversation, &report).await.unwrap(), 0);
    assert!(conversation.is_empty());
}

#[tokio::test]
async fn publish_failure_surfaces_directory_outage() {
    let harness = Harness::new();
    let alice = harness.started_session("alice").await;
    let _bob = harness.started_session("bob").await;
    harness.directory.set_offline(true);

    let err = alice.send_text(&id("bob"), "hello?").await.unwrap_err();
    assert!(err.is_transient(), "got {err:?}");
}
