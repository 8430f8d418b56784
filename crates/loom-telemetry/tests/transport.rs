// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Transport behaviour against a mock collector.

use std::time::Duration;

use loom_telemetry::cipher::{self, Envelope, SecretKey};
use loom_telemetry::transport::{ENCRYPTED_HEADER, RESPONSE_ENCRYPT_HEADER};
use loom_telemetry::{RetryableError, TelemetryError, Transport};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "integration-secret-key";

fn plain_transport() -> Transport {
	Transport::new(loom_telemetry::http::builder().build().unwrap(), None)
}

fn encrypted_transport() -> Transport {
	Transport::new(
		loom_telemetry::http::builder().build().unwrap(),
		Some(SecretKey::from(KEY)),
	)
}

async fn server_responding(status: u16, body: &str) -> MockServer {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/api/events/batch"))
		.respond_with(ResponseTemplate::new(status).set_body_string(body))
		.mount(&server)
		.await;
	server
}

#[tokio::test]
async fn success_returns_body() {
	let server = server_responding(200, r#"{"ok":true}"#).await;
	let url = format!("{}/api/events/batch", server.uri());

	let body = plain_transport().send(&url, br#"{"events":[]}"#).await.unwrap();

	assert_eq!(body, br#"{"ok":true}"#);
}

#[tokio::test]
async fn plaintext_request_is_json() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/api/events/batch"))
		.and(header("content-type", "application/json"))
		.respond_with(ResponseTemplate::new(200))
		.expect(1)
		.mount(&server)
		.await;
	let url = format!("{}/api/events/batch", server.uri());

	plain_transport()
		.send_json(&url, &serde_json::json!({"events": []}))
		.await
		.unwrap();

	let requests = server.received_requests().await.unwrap();
	assert!(requests[0].headers.get(ENCRYPTED_HEADER).is_none());
	let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
	assert_eq!(body, serde_json::json!({"events": []}));
}

#[tokio::test]
async fn server_error_is_retryable() {
	let server = server_responding(503, "unavailable").await;
	let url = format!("{}/api/events/batch", server.uri());

	let err = plain_transport().send(&url, b"{}").await.unwrap_err();

	assert!(err.is_retryable());
	assert_eq!(err.status(), Some(503));
	assert!(err.to_string().starts_with(&format!("POST {url}: status 503: ")));
	assert!(err.to_string().ends_with("server response error: unavailable"));
}

#[tokio::test]
async fn client_error_is_not_retryable() {
	let server = server_responding(404, "not found").await;
	let url = format!("{}/api/events/batch", server.uri());

	let err = plain_transport().send(&url, b"{}").await.unwrap_err();

	assert!(!err.is_retryable());
	assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn too_many_requests_is_not_retryable() {
	let server = server_responding(429, "slow down").await;
	let url = format!("{}/api/events/batch", server.uri());

	let err = plain_transport().send(&url, b"{}").await.unwrap_err();

	assert!(!err.is_retryable());
	assert_eq!(err.status(), Some(429));
}

#[tokio::test]
async fn connection_failure_is_retryable() {
	let server = MockServer::start().await;
	let url = format!("{}/api/events/batch", server.uri());
	drop(server);

	let err = plain_transport().send(&url, b"{}").await.unwrap_err();

	assert!(err.is_retryable());
	assert_eq!(err.status(), None);
	assert!(matches!(err.root_cause(), TelemetryError::NetworkFailure(_)));
}

#[tokio::test]
async fn timeout_is_retryable() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
		.mount(&server)
		.await;
	let url = format!("{}/api/events/batch", server.uri());
	let http = loom_telemetry::http::new_client_with_timeout(Duration::from_millis(100)).unwrap();

	let err = Transport::new(http, None).send(&url, b"{}").await.unwrap_err();

	assert!(err.is_timeout());
	assert!(err.is_retryable());
}

#[tokio::test]
async fn marshal_failure_is_not_retryable() {
	struct Unserializable;

	impl serde::Serialize for Unserializable {
		fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
			Err(serde::ser::Error::custom("refusing to serialize"))
		}
	}

	let err = plain_transport()
		.send_json("http://127.0.0.1:9/api/events/batch", &Unserializable)
		.await
		.unwrap_err();

	assert!(matches!(err, TelemetryError::Marshal(_)));
	assert!(!err.is_retryable());
}

#[tokio::test]
async fn encrypted_request_carries_headers_and_envelope() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(header(ENCRYPTED_HEADER, "1"))
		.and(header(RESPONSE_ENCRYPT_HEADER, "1"))
		.respond_with(ResponseTemplate::new(200).set_body_string("ok"))
		.expect(1)
		.mount(&server)
		.await;
	let url = format!("{}/api/events/batch", server.uri());

	let body = encrypted_transport()
		.send(&url, br#"{"events":[1,2,3]}"#)
		.await
		.unwrap();
	assert_eq!(body, b"ok");

	let requests = server.received_requests().await.unwrap();
	let envelope: Envelope = serde_json::from_slice(&requests[0].body).unwrap();
	assert!(envelope.timestamp > 0);
	assert_eq!(
		envelope.open(&SecretKey::from(KEY)).unwrap(),
		br#"{"events":[1,2,3]}"#
	);
}

#[tokio::test]
async fn encrypted_response_is_decrypted() {
	let key = SecretKey::from(KEY);
	let data = cipher::encrypt(key.expose(), br#"{"accepted":3}"#).unwrap();
	let reply = serde_json::json!({"encrypted": true, "data": data, "timestamp": 1_700_000_000});
	let server = server_responding(200, &reply.to_string()).await;
	let url = format!("{}/api/events/batch", server.uri());

	let body = encrypted_transport().send(&url, b"{}").await.unwrap();

	assert_eq!(body, br#"{"accepted":3}"#);
}

#[tokio::test]
async fn encrypted_error_message_is_decrypted() {
	let key = SecretKey::from(KEY);
	let data = cipher::encrypt(key.expose(), b"quota exceeded").unwrap();
	let reply = serde_json::json!({"encrypted": true, "data": data});
	let server = server_responding(400, &reply.to_string()).await;
	let url = format!("{}/api/events/batch", server.uri());

	let err = encrypted_transport().send(&url, b"{}").await.unwrap_err();

	assert!(err.to_string().ends_with("server response error: quota exceeded"));
}

#[tokio::test]
async fn unencrypted_response_passes_through() {
	let server = server_responding(200, r#"{"status":"ok"}"#).await;
	let url = format!("{}/api/events/batch", server.uri());

	let body = encrypted_transport().send(&url, b"{}").await.unwrap();

	assert_eq!(body, br#"{"status":"ok"}"#);
}

#[tokio::test]
async fn corrupt_encrypted_response_is_an_error() {
	let reply = serde_json::json!({"encrypted": true, "data": "AAAA"});
	let server = server_responding(200, &reply.to_string()).await;
	let url = format!("{}/api/events/batch", server.uri());

	let err = encrypted_transport().send(&url, b"{}").await.unwrap_err();

	assert!(matches!(err, TelemetryError::Decryption(_)));
	assert!(!err.is_retryable());
}
