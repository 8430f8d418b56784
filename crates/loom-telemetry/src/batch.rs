// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event queueing and background batch dispatch.
//!
//! Producers push events into a bounded [`IngestQueue`] without ever waiting.
//! A single [`Dispatcher`] task drains it, grouping events into batches that
//! are sent when either `batch_size` events have accumulated or
//! `flush_interval` has elapsed since the last send. Batches are sent one at
//! a time; a failed batch is reported and dropped.
//!
//! On stop the dispatcher closes the queue, sends what it has accumulated and
//! then drains the remaining queue in `batch_size` chunks before exiting.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use loom_telemetry_core::Event;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::{mpsc, Mutex, Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{Result, TelemetryError};

/// Configuration for the event batch queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
	/// Number of events that triggers an immediate send.
	pub batch_size: usize,
	/// Maximum time an accumulated event waits before being sent.
	pub flush_interval: Duration,
	/// Events held before new ones are dropped.
	pub queue_capacity: usize,
	/// Upper bound on how long an explicit flush waits.
	pub flush_timeout: Duration,
}

impl Default for BatchConfig {
	fn default() -> Self {
		Self {
			batch_size: 20,
			flush_interval: Duration::from_secs(5),
			queue_capacity: 1000,
			flush_timeout: Duration::from_secs(5),
		}
	}
}

impl BatchConfig {
	pub fn validate(&self) -> Result<()> {
		if self.batch_size == 0 {
			return Err(TelemetryError::InvalidConfig(
				"batch size must be at least 1".to_string(),
			));
		}
		if self.queue_capacity == 0 {
			return Err(TelemetryError::InvalidConfig(
				"queue capacity must be at least 1".to_string(),
			));
		}
		if self.queue_capacity > Semaphore::MAX_PERMITS {
			return Err(TelemetryError::InvalidConfig(format!(
				"queue capacity must be at most {}",
				Semaphore::MAX_PERMITS
			)));
		}
		if self.flush_interval.is_zero() {
			return Err(TelemetryError::InvalidConfig(
				"flush interval must be non-zero".to_string(),
			));
		}
		Ok(())
	}
}

/// Handler for sending batched events to the collector.
#[async_trait::async_trait]
pub trait BatchSender: Send + Sync {
	/// Sends one batch. Events are in queue-arrival order.
	async fn send_batch(&self, events: Vec<Event>) -> Result<()>;
}

/// Lifecycle of the dispatcher task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DispatcherState {
	Running = 0,
	Draining = 1,
	Stopped = 2,
}

impl DispatcherState {
	fn from_u8(value: u8) -> Self {
		match value {
			0 => Self::Running,
			1 => Self::Draining,
			_ => Self::Stopped,
		}
	}
}

/// An event the queue refused, handed back to the caller.
#[derive(Debug)]
pub enum Rejected {
	Full(Event),
	Closed(Event),
}

impl Rejected {
	pub fn into_event(self) -> Event {
		match self {
			Rejected::Full(event) | Rejected::Closed(event) => event,
		}
	}
}

/// Producer side of the bounded ingest queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct IngestQueue {
	tx: mpsc::Sender<Event>,
	pending: Arc<AtomicUsize>,
}

/// Consumer side of the ingest queue, owned by the dispatcher.
#[derive(Debug)]
pub struct IngestReceiver {
	rx: mpsc::Receiver<Event>,
	pending: Arc<AtomicUsize>,
}

impl IngestQueue {
	/// Creates a queue holding at most `capacity` events.
	///
	/// # Panics
	///
	/// Panics if `capacity` is zero or above [`Semaphore::MAX_PERMITS`];
	/// [`BatchConfig::validate`] rejects both.
	pub fn bounded(capacity: usize) -> (IngestQueue, IngestReceiver) {
		let (tx, rx) = mpsc::channel(capacity);
		let pending = Arc::new(AtomicUsize::new(0));
		(
			IngestQueue {
				tx,
				pending: Arc::clone(&pending),
			},
			IngestReceiver { rx, pending },
		)
	}

	/// Offers an event without waiting. A full queue rejects the new event
	/// and leaves resident events untouched.
	pub fn try_enqueue(&self, event: Event) -> std::result::Result<(), Rejected> {
		self.pending.fetch_add(1, Ordering::SeqCst);
		self.tx.try_send(event).map_err(|err| {
			self.pending.fetch_sub(1, Ordering::SeqCst);
			match err {
				TrySendError::Full(event) => Rejected::Full(event),
				TrySendError::Closed(event) => Rejected::Closed(event),
			}
		})
	}

	pub fn enqueue(&self, event: Event) -> bool {
		self.try_enqueue(event).is_ok()
	}

	/// Events currently resident in the queue.
	pub fn len(&self) -> usize {
		self.tx.max_capacity() - self.tx.capacity()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn capacity(&self) -> usize {
		self.tx.max_capacity()
	}

	/// Events accepted whose batch has not yet completed, including events
	/// already taken off the queue by the dispatcher.
	pub fn pending(&self) -> usize {
		self.pending.load(Ordering::SeqCst)
	}

	/// True once the dispatcher has closed or dropped its end.
	pub fn is_closed(&self) -> bool {
		self.tx.is_closed()
	}
}

impl IngestReceiver {
	pub async fn recv(&mut self) -> Option<Event> {
		self.rx.recv().await
	}

	/// Takes up to `limit` resident events without waiting.
	pub fn drain_up_to(&mut self, limit: usize) -> Vec<Event> {
		let mut events = Vec::new();
		while events.len() < limit {
			match self.rx.try_recv() {
				Ok(event) => events.push(event),
				Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
			}
		}
		events
	}

	/// Takes every resident event without waiting.
	pub fn drain_nonblocking(&mut self) -> Vec<Event> {
		self.drain_up_to(usize::MAX)
	}

	/// Stops accepting new events. Resident events can still be drained.
	pub fn close(&mut self) {
		self.rx.close();
	}

	fn complete(&self, count: usize) {
		self.pending.fetch_sub(count, Ordering::SeqCst);
	}
}

/// The background batch dispatcher.
pub struct Dispatcher {
	config: BatchConfig,
	receiver: IngestReceiver,
	sender: Arc<dyn BatchSender>,
	diagnostics: Diagnostics,
	stop: CancellationToken,
	flush_requested: Arc<Notify>,
	state: Arc<AtomicU8>,
}

impl Dispatcher {
	/// Starts the dispatcher on the current tokio runtime.
	pub fn spawn(
		config: BatchConfig,
		receiver: IngestReceiver,
		sender: Arc<dyn BatchSender>,
		diagnostics: Diagnostics,
	) -> DispatcherHandle {
		let stop = CancellationToken::new();
		let flush_requested = Arc::new(Notify::new());
		let state = Arc::new(AtomicU8::new(DispatcherState::Running as u8));

		let dispatcher = Dispatcher {
			config,
			receiver,
			sender,
			diagnostics,
			stop: stop.clone(),
			flush_requested: Arc::clone(&flush_requested),
			state: Arc::clone(&state),
		};
		let task = tokio::spawn(dispatcher.run());

		DispatcherHandle {
			stop,
			flush_requested,
			state,
			task: Mutex::new(Some(task)),
		}
	}

	async fn run(mut self) {
		let batch_size = self.config.batch_size;
		let interval = self.config.flush_interval;

		info!(
			batch_size,
			flush_interval_ms = interval.as_millis() as u64,
			"Starting telemetry dispatcher"
		);

		let mut ticker = interval_at(Instant::now() + interval, interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		// Not preallocated: `batch_size` is caller-supplied and unbounded.
		let mut pending: Vec<Event> = Vec::new();

		loop {
			tokio::select! {
				biased;

				_ = self.stop.cancelled() => break,

				_ = self.flush_requested.notified() => {
					pending.extend(self.receiver.drain_nonblocking());
					self.dispatch_chunked(std::mem::take(&mut pending)).await;
					ticker.reset();
				}

				received = self.receiver.recv() => match received {
					Some(event) => {
						pending.push(event);
						if pending.len() >= batch_size {
							self.dispatch(std::mem::take(&mut pending)).await;
							ticker.reset();
						}
					}
					None => break,
				},

				_ = ticker.tick() => {
					if !pending.is_empty() {
						self.dispatch(std::mem::take(&mut pending)).await;
					}
				}
			}
		}

		self.set_state(DispatcherState::Draining);
		self.receiver.close();
		debug!(accumulated = pending.len(), "Draining telemetry queue");

		if !pending.is_empty() {
			self.dispatch(std::mem::take(&mut pending)).await;
		}
		loop {
			let chunk = self.receiver.drain_up_to(batch_size);
			if chunk.is_empty() {
				break;
			}
			self.dispatch(chunk).await;
		}

		self.set_state(DispatcherState::Stopped);
		info!("Telemetry dispatcher stopped");
	}

	async fn dispatch_chunked(&self, mut events: Vec<Event>) {
		while !events.is_empty() {
			let rest = events.split_off(events.len().min(self.config.batch_size));
			self.dispatch(events).await;
			events = rest;
		}
	}

	async fn dispatch(&self, events: Vec<Event>) {
		let count = events.len();
		debug!(count, "Dispatching telemetry batch");

		match self.sender.send_batch(events).await {
			Ok(()) => self.diagnostics.emit(Diagnostic::BatchSent { count }),
			Err(error) => self.diagnostics.emit(Diagnostic::BatchFailed {
				count,
				error: &error,
			}),
		}
		self.receiver.complete(count);
	}

	fn set_state(&self, state: DispatcherState) {
		self.state.store(state as u8, Ordering::SeqCst);
	}
}

/// Control handle for a running [`Dispatcher`].
#[derive(Debug)]
pub struct DispatcherHandle {
	stop: CancellationToken,
	flush_requested: Arc<Notify>,
	state: Arc<AtomicU8>,
	task: Mutex<Option<JoinHandle<()>>>,
}

impl DispatcherHandle {
	/// Asks the dispatcher to send everything it holds now.
	pub fn request_flush(&self) {
		self.flush_requested.notify_one();
	}

	pub fn state(&self) -> DispatcherState {
		DispatcherState::from_u8(self.state.load(Ordering::SeqCst))
	}

	/// Stops the dispatcher and waits for the drain to finish. Calling it
	/// again after the first call returns immediately.
	pub async fn stop(&self) -> Result<()> {
		self.stop.cancel();
		let task = self.task.lock().await.take();
		if let Some(task) = task {
			task.await?;
		}
		Ok(())
	}
}
