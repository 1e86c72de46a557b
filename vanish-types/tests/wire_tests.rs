use chrono::{Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use vanish_types::{EnvelopeError, Identity, MessageEnvelope, SealedPayload, NONCE_LEN};

fn sample() -> MessageEnvelope {
    let created = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    MessageEnvelope::new(
        Identity::new("alice").unwrap(),
        Identity::new("bob").unwrap(),
        SealedPayload {
            ciphertext: b"opaque-ciphertext".to_vec(),
            wrapped_key: vec![0xAB; 104],
            nonce: [3u8; NONCE_LEN],
        },
        created,
        Duration::seconds(60),
    )
    .unwrap()
}

#[test]
fn wire_shape_uses_camel_case_and_base64() {
    let json = serde_json::to_value(sample()).unwrap();
    let obj = json.as_object().unwrap();

    let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(
        keys,
        vec!["ciphertext", "createdAt", "expiresAt", "nonce", "receiver", "sender", "wrappedKey"]
    );
    assert_eq!(obj["sender"], "alice");
    assert_eq!(obj["ciphertext"], "b3BhcXVlLWNpcGhlcnRleHQ=");
    assert_eq!(obj["nonce"], "AwMDAwMDAwMDAwMD");
    assert_eq!(obj["createdAt"], "2026-03-01T12:00:00Z");
    assert_eq!(obj["expiresAt"], "2026-03-01T12:01:00Z");
}

#[test]
fn decoded_envelope_keeps_identity() {
    let env = sample();
    let json = serde_json::to_string(&env).unwrap();
    let back: MessageEnvelope = serde_json::from_str(&json).unwrap();
    assert_eq!(back, env);
    assert_eq!(back.id(), env.id());
}

#[test]
fn field_order_does_not_matter() {
    let json = r#"{
        "expiresAt": "2026-03-01T12:01:00Z",
        "nonce": "AwMDAwMDAwMDAwMD",
        "wrappedKey": "q6ur",
        "ciphertext": "AAEC",
        "receiver": "bob",
        "createdAt": "2026-03-01T12:00:00Z",
        "sender": "alice"
    }"#;
    let env: MessageEnvelope = serde_json::from_str(json).unwrap();
    assert_eq!(env.ciphertext(), &[0, 1, 2]);
    assert_eq!(env.wrapped_key(), &[0xAB, 0xAB, 0xAB]);
}

#[test]
fn rejects_deadline_not_after_creation() {
    let json = r#"{
        "sender": "alice", "receiver": "bob",
        "ciphertext": "AAEC", "wrappedKey": "q6ur", "nonce": "AwMDAwMDAwMDAwMD",
        "createdAt": "2026-03-01T12:00:00Z", "expiresAt": "2026-03-01T12:00:00Z"
    }"#;
    let err = serde_json::from_str::<MessageEnvelope>(json).unwrap_err();
    assert!(err.to_string().contains("lifetime"), "got: {err}");
}

#[test]
fn rejects_wrong_nonce_length() {
    let json = r#"{
        "sender": "alice", "receiver": "bob",
        "ciphertext": "AAEC", "wrappedKey": "q6ur", "nonce": "AAEC",
        "createdAt": "2026-03-01T12:00:00Z", "expiresAt": "2026-03-01T12:01:00Z"
    }"#;
    let err = serde_json::from_str::<MessageEnvelope>(json).unwrap_err();
    assert!(err.to_string().contains("nonce"), "got: {err}");
}

#[test]
fn rejects_bad_base64() {
    let json = r#"{
        "sender": "alice", "receiver": "bob",
        "ciphertext": "***", "wrappedKey": "q6ur", "nonce": "AwMDAwMDAwMDAwMD",
        "createdAt": "2026-03-01T12:00:00Z", "expiresAt": "2026-03-01T12:01:00Z"
    }"#;
    assert!(serde_json::from_str::<MessageEnvelope>(json).is_err());
}

#[test]
fn from_parts_enforces_lifetime() {
    let env = sample();
    let err = MessageEnvelope::from_parts(
        env.sender().clone(),
        env.receiver().clone(),
        env.payload().clone(),
        env.expires_at(),
        env.created_at(),
    )
    .unwrap_err();
    assert_eq!(err, EnvelopeError::InvalidLifetime);
}
