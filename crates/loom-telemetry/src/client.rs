// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Telemetry client for tracking events from an application.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use loom_telemetry_core::{generate_device_id, Event, EventBatch};
use reqwest::Url;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::batch::{BatchConfig, BatchSender, Dispatcher, DispatcherHandle, DispatcherState, IngestQueue, Rejected};
use crate::cipher::SecretKey;
use crate::diagnostics::{Diagnostic, DiagnosticSink, Diagnostics, DropReason};
use crate::error::{Result, TelemetryError};
use crate::properties::Properties;
use crate::transport::Transport;

pub(crate) const EVENTS_PATH: &str = "/api/events/batch";
pub(crate) const INSTALLS_PATH: &str = "/api/installs/push";

const FLUSH_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Configuration for the telemetry client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
	/// Timeout for each HTTP request.
	pub request_timeout: Duration,
	pub batch: BatchConfig,
	/// Forward diagnostics to the configured sink.
	pub debug: bool,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			request_timeout: Duration::from_secs(10),
			batch: BatchConfig::default(),
			debug: false,
		}
	}
}

/// Builder for constructing a [`TelemetryClient`].
pub struct TelemetryClientBuilder {
	pub(crate) server_url: Option<String>,
	pub(crate) product: Option<String>,
	pub(crate) device_id: Option<String>,
	pub(crate) user_id: Option<String>,
	pub(crate) secret_key: Option<SecretKey>,
	pub(crate) config: ClientConfig,
	diagnostic_sink: Option<Arc<dyn DiagnosticSink>>,
}

impl TelemetryClientBuilder {
	pub fn new() -> Self {
		Self {
			server_url: None,
			product: None,
			device_id: None,
			user_id: None,
			secret_key: None,
			config: ClientConfig::default(),
			diagnostic_sink: None,
		}
	}

	/// Sets the collector base URL, e.g. `https://telemetry.example.com`.
	pub fn server_url(mut self, url: impl Into<String>) -> Self {
		self.server_url = Some(url.into());
		self
	}

	pub fn product(mut self, product: impl Into<String>) -> Self {
		self.product = Some(product.into());
		self
	}

	/// Overrides the generated device id.
	pub fn device_id(mut self, device_id: impl Into<String>) -> Self {
		self.device_id = Some(device_id.into());
		self
	}

	pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
		self.user_id = Some(user_id.into());
		self
	}

	/// Enables payload encryption. Any key length is accepted and normalized.
	pub fn secret_key(mut self, key: impl Into<SecretKey>) -> Self {
		self.secret_key = Some(key.into());
		self
	}

	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.config.request_timeout = timeout;
		self
	}

	pub fn batch_size(mut self, size: usize) -> Self {
		self.config.batch.batch_size = size;
		self
	}

	pub fn flush_interval(mut self, interval: Duration) -> Self {
		self.config.batch.flush_interval = interval;
		self
	}

	pub fn queue_capacity(mut self, capacity: usize) -> Self {
		self.config.batch.queue_capacity = capacity;
		self
	}

	/// Sets how long [`TelemetryClient::flush`] waits at most.
	pub fn flush_timeout(mut self, timeout: Duration) -> Self {
		self.config.batch.flush_timeout = timeout;
		self
	}

	pub fn debug(mut self, debug: bool) -> Self {
		self.config.debug = debug;
		self
	}

	/// Receives diagnostics while debug mode is on.
	pub fn diagnostic_sink(mut self, sink: impl DiagnosticSink + 'static) -> Self {
		self.diagnostic_sink = Some(Arc::new(sink));
		self
	}

	/// Builds the client and starts the background dispatcher.
	///
	/// Must be called from within a tokio runtime.
	pub fn build(self) -> Result<TelemetryClient> {
		let server_url = self
			.server_url
			.filter(|url| !url.trim().is_empty())
			.ok_or(TelemetryError::InvalidServerUrl)?;
		let server_url = server_url.trim().trim_end_matches('/').to_string();
		match Url::parse(&server_url) {
			Ok(url) if matches!(url.scheme(), "http" | "https") => {}
			_ => return Err(TelemetryError::InvalidServerUrl),
		}

		let product = self
			.product
			.filter(|product| !product.trim().is_empty())
			.ok_or(TelemetryError::InvalidProductName)?;

		self.config.batch.validate()?;
		if self.config.request_timeout.is_zero() {
			return Err(TelemetryError::InvalidConfig(
				"request timeout must be non-zero".to_string(),
			));
		}
		let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
			TelemetryError::InvalidConfig("client must be built inside a tokio runtime".to_string())
		})?;

		let device_id = self
			.device_id
			.filter(|id| !id.is_empty())
			.unwrap_or_else(generate_device_id);
		let session_id = Uuid::new_v4().to_string();
		let user_id = Arc::new(RwLock::new(self.user_id.unwrap_or_default()));

		let http_client = crate::http::new_client_with_timeout(self.config.request_timeout)?;
		let transport = Transport::new(http_client, self.secret_key);
		let diagnostics = Diagnostics::new(self.config.debug, self.diagnostic_sink);

		let sender = Arc::new(HttpBatchSender {
			transport: transport.clone(),
			url: format!("{server_url}{EVENTS_PATH}"),
			product: product.clone(),
			device_id: device_id.clone(),
			session_id: session_id.clone(),
			user_id: Arc::clone(&user_id),
		});

		let (queue, receiver) = IngestQueue::bounded(self.config.batch.queue_capacity);
		let dispatcher = Dispatcher::spawn(
			self.config.batch.clone(),
			receiver,
			sender,
			diagnostics.clone(),
		);

		info!(
			server_url = %server_url,
			product = %product,
			session_id = %session_id,
			encrypted = transport.is_encrypted(),
			"Telemetry client initialized"
		);

		Ok(TelemetryClient {
			inner: Arc::new(ClientInner {
				server_url,
				product,
				device_id,
				session_id,
				session_started: Utc::now(),
				user_id,
				transport,
				queue,
				dispatcher,
				diagnostics,
				config: self.config,
				runtime,
				closed: AtomicBool::new(false),
			}),
		})
	}
}

impl Default for TelemetryClientBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Sends batches to `POST /api/events/batch`.
struct HttpBatchSender {
	transport: Transport,
	url: String,
	product: String,
	device_id: String,
	session_id: String,
	user_id: Arc<RwLock<String>>,
}

#[async_trait::async_trait]
impl BatchSender for HttpBatchSender {
	async fn send_batch(&self, events: Vec<Event>) -> Result<()> {
		let batch = EventBatch {
			product: self.product.clone(),
			device_id: self.device_id.clone(),
			user_id: self.user_id.read().await.clone(),
			session_id: self.session_id.clone(),
			events,
		};

		debug!(url = %self.url, count = batch.events.len(), "Sending telemetry batch");

		self.transport
			.send_json(&self.url, &batch)
			.await
			.map(|_| ())
			.map_err(|e| TelemetryError::wrap("send_events", e))
	}
}

struct ClientInner {
	server_url: String,
	product: String,
	device_id: String,
	session_id: String,
	session_started: DateTime<Utc>,
	user_id: Arc<RwLock<String>>,
	transport: Transport,
	queue: IngestQueue,
	dispatcher: DispatcherHandle,
	diagnostics: Diagnostics,
	config: ClientConfig,
	runtime: tokio::runtime::Handle,
	closed: AtomicBool,
}

/// Client for tracking telemetry events.
///
/// Cloning is cheap; clones share the same queue and session.
///
/// # Example
///
/// ```ignore
/// use loom_telemetry::{Properties, TelemetryClient};
///
/// let client = TelemetryClient::builder()
///     .server_url("https://telemetry.example.com")
///     .product("MyApp")
///     .secret_key("shared-secret")
///     .build()?;
///
/// client.track("file_opened", Properties::new().insert("kind", "markdown"));
/// client.track_event("editor", "save", "shortcut", 1.0);
///
/// client.close().await?;
/// ```
#[derive(Clone)]
pub struct TelemetryClient {
	inner: Arc<ClientInner>,
}

impl TelemetryClient {
	pub fn builder() -> TelemetryClientBuilder {
		TelemetryClientBuilder::new()
	}

	/// Queues an event. Returns false if it was dropped because the queue is
	/// full or the client is closed.
	pub fn track(&self, name: impl Into<String>, properties: Properties) -> bool {
		self.enqueue(Event::new(name).with_properties(properties.into_map()))
	}

	/// Queues an event in the category/action/label/value shape.
	pub fn track_event(
		&self,
		category: impl Into<String>,
		action: impl Into<String>,
		label: impl Into<String>,
		value: f64,
	) -> bool {
		self.enqueue(Event::classified(category, action, label, value))
	}

	/// Queues several events, returning how many were accepted.
	pub fn track_batch(&self, events: impl IntoIterator<Item = Event>) -> usize {
		events
			.into_iter()
			.map(|event| self.enqueue(event))
			.filter(|accepted| *accepted)
			.count()
	}

	/// Sends a single event immediately, bypassing the queue.
	pub async fn track_sync(&self, name: impl Into<String>, properties: Properties) -> Result<()> {
		let mut event = Event::new(name).with_properties(properties.into_map());
		event.stamp(Utc::now());
		self.send_now("track_sync", event).await
	}

	/// Asks the dispatcher to send everything queued and waits until it has
	/// been handled or the flush timeout elapses.
	pub async fn flush(&self) {
		if self.is_closed() {
			return;
		}
		self.inner.dispatcher.request_flush();

		let queue = &self.inner.queue;
		let waited = tokio::time::timeout(self.inner.config.batch.flush_timeout, async {
			while queue.pending() > 0 {
				tokio::time::sleep(FLUSH_POLL_INTERVAL).await;
			}
		})
		.await;

		if waited.is_err() {
			debug!(pending = queue.pending(), "Telemetry flush timed out");
		}
	}

	/// Stops accepting events and delivers everything still queued.
	///
	/// Calling it again is a no-op.
	pub async fn close(&self) -> Result<()> {
		if self.inner.closed.swap(true, Ordering::SeqCst) {
			return Ok(());
		}

		info!(pending = self.inner.queue.pending(), "Closing telemetry client");

		self.inner
			.dispatcher
			.stop()
			.await
			.map_err(|e| TelemetryError::wrap("close", e))?;

		info!("Telemetry client closed");
		Ok(())
	}

	pub fn device_id(&self) -> &str {
		&self.inner.device_id
	}

	pub fn session_id(&self) -> &str {
		&self.inner.session_id
	}

	pub fn session_started(&self) -> DateTime<Utc> {
		self.inner.session_started
	}

	pub fn product(&self) -> &str {
		&self.inner.product
	}

	pub fn server_url(&self) -> &str {
		&self.inner.server_url
	}

	/// Sets the user id attached to batches sent from now on.
	pub async fn set_user_id(&self, user_id: impl Into<String>) {
		*self.inner.user_id.write().await = user_id.into();
	}

	pub async fn user_id(&self) -> String {
		self.inner.user_id.read().await.clone()
	}

	/// Events currently waiting in the queue.
	pub fn queue_len(&self) -> usize {
		self.inner.queue.len()
	}

	pub fn is_closed(&self) -> bool {
		self.inner.closed.load(Ordering::SeqCst)
	}

	pub fn dispatcher_state(&self) -> DispatcherState {
		self.inner.dispatcher.state()
	}

	pub(crate) fn diagnostics(&self) -> &Diagnostics {
		&self.inner.diagnostics
	}

	pub(crate) fn transport(&self) -> &Transport {
		&self.inner.transport
	}

	pub(crate) fn runtime(&self) -> &tokio::runtime::Handle {
		&self.inner.runtime
	}

	pub(crate) fn endpoint(&self, path: &str) -> String {
		format!("{}{path}", self.inner.server_url)
	}

	pub(crate) fn enqueue(&self, mut event: Event) -> bool {
		if self.is_closed() {
			self.inner.diagnostics.emit(Diagnostic::EventDropped {
				name: &event.name,
				reason: DropReason::ClientClosed,
			});
			return false;
		}

		event.stamp(Utc::now());
		match self.inner.queue.try_enqueue(event) {
			Ok(()) => true,
			Err(rejected) => {
				let reason = match rejected {
					Rejected::Full(_) => DropReason::QueueFull,
					Rejected::Closed(_) => DropReason::ClientClosed,
				};
				let event = rejected.into_event();
				self.inner.diagnostics.emit(Diagnostic::EventDropped {
					name: &event.name,
					reason,
				});
				false
			}
		}
	}

	/// Posts a single-event batch and waits for the response.
	pub(crate) async fn send_now(&self, op: &str, event: Event) -> Result<()> {
		if self.is_closed() {
			return Err(TelemetryError::operation(op, TelemetryError::ClientClosed));
		}

		let batch = EventBatch {
			product: self.inner.product.clone(),
			device_id: self.inner.device_id.clone(),
			user_id: self.user_id().await,
			session_id: self.inner.session_id.clone(),
			events: vec![event],
		};

		self.inner
			.transport
			.send_json(&self.endpoint(EVENTS_PATH), &batch)
			.await
			.map(|_| ())
			.map_err(|e| TelemetryError::wrap(op, e))
	}
}

impl std::fmt::Debug for TelemetryClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TelemetryClient")
			.field("server_url", &self.inner.server_url)
			.field("product", &self.inner.product)
			.field("session_id", &self.inner.session_id)
			.field("closed", &self.is_closed())
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Mutex;
	use wiremock::matchers::method;
	use wiremock::{Mock, MockServer, ResponseTemplate};

	const SERVER: &str = "http://127.0.0.1:9";

	fn builder() -> TelemetryClientBuilder {
		TelemetryClient::builder()
			.server_url(SERVER)
			.product("MyApp")
			.device_id("device-123")
	}

	#[test]
	fn test_builder_requires_server_url() {
		let result = TelemetryClient::builder().product("MyApp").build();

		assert!(matches!(result, Err(TelemetryError::InvalidServerUrl)));
	}

	#[test]
	fn test_builder_rejects_malformed_server_url() {
		for url in ["   ", "not a url", "ftp://example.com"] {
			let result = TelemetryClient::builder().server_url(url).product("MyApp").build();
			assert!(matches!(result, Err(TelemetryError::InvalidServerUrl)), "{url}");
		}
	}

	#[test]
	fn test_builder_requires_product() {
		let result = TelemetryClient::builder().server_url(SERVER).product("").build();

		assert!(matches!(result, Err(TelemetryError::InvalidProductName)));
	}

	#[test]
	fn test_builder_rejects_zero_batch_size() {
		let result = builder().batch_size(0).build();

		assert!(matches!(result, Err(TelemetryError::InvalidConfig(_))));
	}

	#[test]
	fn test_builder_requires_runtime() {
		let result = builder().build();

		assert!(matches!(result, Err(TelemetryError::InvalidConfig(_))));
	}

	#[test]
	fn test_client_config_defaults() {
		let config = ClientConfig::default();

		assert_eq!(config.request_timeout, Duration::from_secs(10));
		assert_eq!(config.batch.batch_size, 20);
		assert!(!config.debug);
	}

	#[tokio::test]
	async fn test_builder_trims_trailing_slash() {
		let client = TelemetryClient::builder()
			.server_url("https://telemetry.example.com/")
			.product("MyApp")
			.device_id("d")
			.build()
			.unwrap();

		assert_eq!(client.server_url(), "https://telemetry.example.com");
		assert_eq!(
			client.endpoint(EVENTS_PATH),
			"https://telemetry.example.com/api/events/batch"
		);
		client.close().await.unwrap();
	}

	#[tokio::test]
	async fn test_identity() {
		let client = builder().build().unwrap();

		assert_eq!(client.device_id(), "device-123");
		assert_eq!(client.product(), "MyApp");
		assert!(Uuid::parse_str(client.session_id()).is_ok());
		assert!(client.session_started() <= Utc::now());

		let other = builder().build().unwrap();
		assert_ne!(client.session_id(), other.session_id());

		client.close().await.unwrap();
		other.close().await.unwrap();
	}

	#[tokio::test]
	async fn test_generates_device_id_when_not_set() {
		let client = TelemetryClient::builder()
			.server_url(SERVER)
			.product("MyApp")
			.build()
			.unwrap();

		assert!(!client.device_id().is_empty());
		client.close().await.unwrap();
	}

	#[tokio::test]
	async fn test_set_user_id() {
		let client = builder().user_id("alice").build().unwrap();
		assert_eq!(client.user_id().await, "alice");

		client.set_user_id("bob").await;
		assert_eq!(client.user_id().await, "bob");

		client.close().await.unwrap();
	}

	#[tokio::test]
	async fn test_track_queues_event() {
		let client = builder().build().unwrap();

		assert!(client.track("app_start", Properties::new().insert("cold", true)));
		assert!(client.track_event("user", "login", "email", 1.0));
		assert_eq!(client.queue_len(), 2);
	}

	#[tokio::test]
	async fn test_full_queue_reports_drop() {
		let seen = Arc::new(Mutex::new(Vec::new()));
		let captured = Arc::clone(&seen);
		let client = builder()
			.queue_capacity(1)
			.debug(true)
			.diagnostic_sink(move |d: &Diagnostic<'_>| {
				captured.lock().unwrap().push(d.to_string());
			})
			.build()
			.unwrap();

		assert!(client.track("first", Properties::new()));
		assert!(!client.track("second", Properties::new()));

		assert_eq!(
			*seen.lock().unwrap(),
			vec!["event \"second\" dropped: queue full".to_string()]
		);
	}

	#[tokio::test]
	async fn test_close_prevents_track() {
		let client = builder().build().unwrap();

		client.close().await.unwrap();

		assert!(client.is_closed());
		assert!(!client.track("late", Properties::new()));
		assert_eq!(client.track_batch(vec![Event::new("a"), Event::new("b")]), 0);
		assert_eq!(client.dispatcher_state(), DispatcherState::Stopped);

		let result = client.track_sync("late", Properties::new()).await;
		match result {
			Err(TelemetryError::Operation(op)) => {
				assert_eq!(op.op, "track_sync");
				assert!(matches!(*op.source, TelemetryError::ClientClosed));
			}
			other => panic!("unexpected result: {other:?}"),
		}
	}

	#[tokio::test]
	async fn test_double_close_is_ok() {
		let client = builder().build().unwrap();

		client.close().await.unwrap();
		client.close().await.unwrap();
	}

	#[tokio::test]
	async fn test_builder_rejects_oversized_queue_capacity() {
		let result = builder().queue_capacity(usize::MAX).build();

		match result {
			Err(TelemetryError::InvalidConfig(message)) => assert!(message.contains("queue capacity")),
			other => panic!("unexpected result: {other:?}"),
		}
	}

	#[tokio::test]
	async fn test_flush_returns_after_timeout_when_collector_stalls() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
			.mount(&server)
			.await;
		let client = TelemetryClient::builder()
			.server_url(server.uri())
			.product("MyApp")
			.device_id("device-123")
			.flush_interval(Duration::from_secs(60))
			.flush_timeout(Duration::from_millis(200))
			.build()
			.unwrap();

		client.track("stalled", Properties::new());
		let started = std::time::Instant::now();
		client.flush().await;
		let elapsed = started.elapsed();

		assert!(elapsed >= Duration::from_millis(200), "{elapsed:?}");
		assert!(elapsed < Duration::from_millis(1500), "{elapsed:?}");
		assert_eq!(client.inner.queue.pending(), 1);

		client.close().await.unwrap();
		assert_eq!(client.inner.queue.pending(), 0);
		assert_eq!(server.received_requests().await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_flush_after_close_returns_immediately() {
		let client = builder().build().unwrap();
		client.close().await.unwrap();

		tokio::time::timeout(Duration::from_millis(100), client.flush())
			.await
			.unwrap();
	}
}
