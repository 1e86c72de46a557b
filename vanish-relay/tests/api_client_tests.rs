use base64::{engine::general_purpose::STANDARD, Engine};
use vanish_crypto::{IdentityKeyPair, RecipientKey};
use vanish_relay::{HttpDirectory, VanishConfig};
use vanish_types::Identity;
use vanish_vault::{Directory, DirectoryError};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn setup(server: &MockServer) -> HttpDirectory {
    let config = VanishConfig {
        directory_base_url: server.uri(),
        request_timeout_secs: 5,
        ..VanishConfig::default()
    };
    HttpDirectory::new(&config).unwrap()
}

fn id(s: &str) -> Identity {
    Identity::new(s).unwrap()
}

// ── Lookup ──

#[tokio::test]
async fn get_public_key_decodes_base64_spki() {
    let server = MockServer::start().await;
    let keypair = IdentityKeyPair::generate().unwrap();
    Mock::given(method("GET"))
        .and(path("/userPublicKey/bob"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "publicKey": keypair.public_key().to_base64() })),
        )
        .mount(&server)
        .await;

    let der = setup(&server).get_public_key(&id("bob")).await.unwrap();
    assert_eq!(RecipientKey::from_spki_der(&der).unwrap(), *keypair.public_key());
}

#[tokio::test]
async fn get_public_key_404_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/userPublicKey/carol"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(serde_json::json!({ "error": "Public key not found" })),
        )
        .mount(&server)
        .await;

    let err = setup(&server).get_public_key(&id("carol")).await.unwrap_err();
    assert_eq!(err, DirectoryError::NotFound(id("carol")));
}

#[tokio::test]
async fn null_public_key_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/userPublicKey/dave"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "publicKey": null })))
        .mount(&server)
        .await;

    let err = setup(&server).get_public_key(&id("dave")).await.unwrap_err();
    assert!(matches!(err, DirectoryError::NotFound(_)));
}

#[tokio::test]
async fn server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/userPublicKey/bob"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = setup(&server).get_public_key(&id("bob")).await.unwrap_err();
    assert!(err.is_transient(), "got {err:?}");
}

#[tokio::test]
async fn bad_base64_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/userPublicKey/bob"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "publicKey": "%%%" })))
        .mount(&server)
        .await;

    let err = setup(&server).get_public_key(&id("bob")).await.unwrap_err();
    assert!(matches!(err, DirectoryError::Rejected(_)), "got {err:?}");
}

#[tokio::test]
async fn identity_is_percent_encoded_in_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/userPublicKey/bob%20smith"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = setup(&server).get_public_key(&id("bob smith")).await.unwrap_err();
    assert!(matches!(err, DirectoryError::NotFound(_)));
}

#[tokio::test]
async fn unreachable_directory_is_transient() {
    let config = VanishConfig {
        directory_base_url: "http://127.0.0.1:9".into(),
        request_timeout_secs: 2,
        ..VanishConfig::default()
    };
    let directory = HttpDirectory::new(&config).unwrap();
    let err = directory.get_public_key(&id("bob")).await.unwrap_err();
    assert!(err.is_transient(), "got {err:?}");
}

// ── Publish ──

#[tokio::test]
async fn set_public_key_posts_username_and_base64() {
    let server = MockServer::start().await;
    let keypair = IdentityKeyPair::generate().unwrap();
    let der = keypair.public_key().to_spki_der();

    Mock::given(method("POST"))
        .and(path("/updatePublicKey"))
        .and(body_json(serde_json::json!({
            "username": "alice",
            "publicKey": STANDARD.encode(&der),
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    setup(&server).set_public_key(&id("alice"), &der).await.unwrap();
}

#[tokio::test]
async fn set_public_key_client_error_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/updatePublicKey"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let err = setup(&server)
        .set_public_key(&id("alice"), b"key")
        .await
        .unwrap_err();
    assert!(matches!(err, DirectoryError::Rejected(_)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn base_url_with_path_prefix_is_respected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/userPublicKey/bob"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let config = VanishConfig {
        directory_base_url: format!("{}/api/", server.uri()),
        ..VanishConfig::default()
    };
    let directory = HttpDirectory::new(&config).unwrap();
    assert!(matches!(
        directory.get_public_key(&id("bob")).await,
        Err(DirectoryError::NotFound(_))
    ));
}
