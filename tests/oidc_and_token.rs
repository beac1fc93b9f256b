mod common;
use common::{memory_logger, Scripted, ScriptedTransport};

use apilink::errors::ClientErrorKind;
use apilink::managers::discovery::OidcDiscovery;
use apilink::managers::token::TokenClient;
use apilink::services::logger::LogRecord;
use apilink::services::transport::ReqwestTransport;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport() -> Arc<ReqwestTransport> {
    Arc::new(ReqwestTransport::new().expect("transport"))
}

#[tokio::test]
async fn discovery_fetches_document_then_jwks() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": "https://login.example.org",
            "jwks_uri": format!("{}/oidc/jwks", server.uri()),
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/oidc/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keys": [{"kid": "k1", "kty": "RSA"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (logger, _) = memory_logger();
    let discovery = OidcDiscovery::new(
        logger,
        transport(),
        &format!("{}/.well-known/openid-configuration", server.uri()),
    );
    let metadata = discovery.discover().await.expect("metadata");

    assert_eq!(metadata.issuer(), Some("https://login.example.org"));
    assert_eq!(metadata.keys().len(), 1);
    assert_eq!(metadata.keys()[0]["kid"], "k1");
}

#[tokio::test]
async fn discovery_requires_a_jwks_uri() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"issuer": "x"})))
        .mount(&server)
        .await;

    let (logger, _) = memory_logger();
    let err = OidcDiscovery::new(
        logger,
        transport(),
        &format!("{}/.well-known/openid-configuration", server.uri()),
    )
    .discover()
    .await
    .expect_err("missing jwks_uri");

    assert_eq!(err.kind, ClientErrorKind::InvalidConfig);
    assert!(err.message.contains("jwkEndpoint missing"));
}

#[tokio::test]
async fn client_tokens_are_fetched_once_while_fresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oauth/token"))
        .and(query_param("grant_type", "client_credential"))
        .and(query_param("client_id", "app"))
        .and(query_param("client_secret", "s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "abc",
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": "read"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (logger, sink) = memory_logger();
    let client = TokenClient::new(
        logger,
        transport(),
        &format!("{}/oauth/token", server.uri()),
        "app",
        "s3cret",
    )
    .expect("client");

    let first = client.client_token().await.expect("first");
    let second = client.client_token().await.expect("second");

    assert_eq!(first.access_token, "abc");
    assert_eq!(first, second);
    assert_eq!(first.extra["scope"], "read");
    assert!(sink
        .records()
        .iter()
        .all(|r| !r.meta.as_ref().map(|m| m.to_string()).unwrap_or_default().contains("s3cret")));
}

#[tokio::test]
async fn short_lived_tokens_are_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "short",
            "expires_in": 10
        })))
        .expect(2)
        .mount(&server)
        .await;

    let (logger, _) = memory_logger();
    let client = TokenClient::new(
        logger,
        transport(),
        &format!("{}/oauth/token", server.uri()),
        "app",
        "s3cret",
    )
    .expect("client");

    client.client_token().await.expect("first");
    client.client_token().await.expect("second");
}

#[tokio::test]
async fn rejected_token_requests_surface_the_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "invalid_client"})))
        .mount(&server)
        .await;

    let (logger, _) = memory_logger();
    let client = TokenClient::new(
        logger,
        transport(),
        &format!("{}/oauth/token", server.uri()),
        "app",
        "wrong",
    )
    .expect("client");
    let err = client.client_token().await.expect_err("rejected");

    assert_eq!(err.kind, ClientErrorKind::BadStatus);
    assert_eq!(err.status(), Some(401));
}

fn leaks(records: &[LogRecord], secret: &str) -> usize {
    records
        .iter()
        .filter(|r| {
            r.message.contains(secret)
                || r.meta.as_ref().map(|m| m.to_string()).unwrap_or_default().contains(secret)
        })
        .count()
}

#[tokio::test]
async fn failed_token_calls_keep_the_secret_out_of_errors_and_logs() {
    let transport = ScriptedTransport::new();
    transport.always("/token", Scripted::Refused);
    let (logger, sink) = memory_logger();
    let client = TokenClient::new(logger, transport, "http://login.local/token", "id", "SUPERSECRET")
        .expect("client");

    let err = client.client_token().await.expect_err("refused");

    assert_eq!(err.kind, ClientErrorKind::Network);
    assert!(!err.message.contains("SUPERSECRET"), "{}", err.message);
    assert!(err.message.contains("http://login.local/token"));
    assert!(!err.to_string().contains("client_secret"));
    assert_eq!(leaks(&sink.records(), "SUPERSECRET"), 0);
}

#[tokio::test]
async fn timed_out_token_calls_keep_the_secret_out_of_retry_warnings() {
    let transport = ScriptedTransport::new();
    transport.always("/token", Scripted::Timeout);
    let (logger, sink) = memory_logger();
    let client = TokenClient::new(logger, transport, "http://login.local/token", "id", "SUPERSECRET")
        .expect("client");

    let err = client.client_token().await.expect_err("exhausted");

    assert_eq!(err.kind, ClientErrorKind::RetryExhausted);
    assert!(!err.message.contains("SUPERSECRET"));
    assert!(sink.records().len() > 1);
    assert_eq!(leaks(&sink.records(), "SUPERSECRET"), 0);
}

#[tokio::test]
async fn unreachable_token_endpoints_do_not_leak_through_reqwest_errors() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);

    let (logger, sink) = memory_logger();
    let client = TokenClient::new(
        logger,
        transport(),
        &format!("http://127.0.0.1:{}/token", port),
        "id",
        "SUPERSECRET",
    )
    .expect("client");

    let err = client.client_token().await.expect_err("refused");

    assert!(!err.message.contains("SUPERSECRET"), "{}", err.message);
    assert_eq!(leaks(&sink.records(), "SUPERSECRET"), 0);
}
