//! Session controller: owns the end-to-end lifecycle of one streaming
//! session and enforces single-flight.
//!
//! One session is one task tree: the transport task feeds raw fragments, the
//! controller task decodes and routes them, and the scheduler task drains the
//! reassembly buffer into the voice pool. Cancellation flows down a single
//! token; the session's state only becomes `Cancelled` after transport abort,
//! voice stop, and buffer reset have all happened, so callers never observe
//! partial teardown.

use crate::audio::chunk::AudioChunk;
use crate::audio::voice::{VoicePool, VoiceSink};
use crate::audio::{pcm, wav};
use crate::config::Config;
use crate::defaults::{EVENT_CHANNEL_SIZE, TRANSPORT_CHANNEL_SIZE};
use crate::error::{Result, VoxtalkError};
use crate::stream::buffer::ReassemblyBuffer;
use crate::stream::decoder::MessageDecoder;
use crate::stream::events::SessionEvent;
use crate::stream::message::StreamMessage;
use crate::stream::scheduler::PlaybackScheduler;
use crate::stream::transport::{StreamTransport, TransportEvent};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Lifecycle of one streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Requesting,
    Streaming,
    Draining,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    /// True once the session can no longer produce events.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Idle
                | SessionState::Completed
                | SessionState::Cancelled
                | SessionState::Failed
        )
    }
}

/// Caller's view of a running session.
#[derive(Clone)]
pub struct SessionHandle {
    cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    /// Requests cancellation. Teardown is cooperative; the state becomes
    /// `Cancelled` only once it has fully happened. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Waits until the session reaches a terminal state and returns it.
    pub async fn wait_terminal(&mut self) -> SessionState {
        loop {
            let current = *self.state.borrow_and_update();
            if current.is_terminal() {
                return current;
            }
            if self.state.changed().await.is_err() {
                return *self.state.borrow();
            }
        }
    }

    /// Waits until the session state satisfies `pred`, or the session ends.
    pub async fn wait_for(&mut self, pred: impl Fn(SessionState) -> bool) -> SessionState {
        loop {
            let current = *self.state.borrow_and_update();
            if pred(current) || current.is_terminal() {
                return current;
            }
            if self.state.changed().await.is_err() {
                return *self.state.borrow();
            }
        }
    }
}

struct ActiveSession {
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

/// Owns the voice pool and at most one non-terminal session at a time.
pub struct SessionController<V: VoiceSink + 'static> {
    config: Config,
    pool: Arc<VoicePool<V>>,
    active: Option<ActiveSession>,
}

impl<V: VoiceSink + 'static> SessionController<V> {
    pub fn new(config: Config, pool: Arc<VoicePool<V>>) -> Self {
        Self {
            config,
            pool,
            active: None,
        }
    }

    /// Starts a session against `endpoint` with an opaque JSON request body.
    ///
    /// Single-flight: any session still in flight is cancelled and fully
    /// torn down before the new one begins, so no event from the superseded
    /// session can be observed afterwards.
    pub async fn start(
        &mut self,
        endpoint: &str,
        body: String,
    ) -> Result<(mpsc::Receiver<SessionEvent>, SessionHandle)> {
        self.cancel_active().await;

        let transport = StreamTransport::new(endpoint, self.config.stream.request_timeout())?;
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let (state_tx, state_rx) = watch::channel(SessionState::Requesting);
        let cancel = CancellationToken::new();

        let session = SessionTask {
            config: self.config.clone(),
            transport,
            body,
            pool: self.pool.clone(),
            buffer: Arc::new(ReassemblyBuffer::new(self.config.buffer.capacity)),
            events: event_tx,
            state: state_tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(session.run());

        let handle = SessionHandle {
            cancel: cancel.clone(),
            state: state_rx,
        };
        self.active = Some(ActiveSession { cancel, task });
        Ok((event_rx, handle))
    }

    /// Cancels the active session, if any, and waits for its teardown to
    /// finish: transport aborted, voices stopped, buffer reset, task joined.
    pub async fn cancel_active(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            if let Err(e) = active.task.await {
                tracing::warn!("session task ended abnormally: {e}");
            }
        }
    }

    /// State of the most recently started session, if one exists.
    pub fn has_active(&self) -> bool {
        self.active.is_some()
    }
}

enum StreamOutcome {
    /// Production ended (Complete seen or stream closed); drain and finish.
    Drained,
    /// Transport or server failure; terminal.
    Failed(VoxtalkError),
    /// Cancellation was requested.
    Cancelled,
}

struct SessionTask<V: VoiceSink + 'static> {
    config: Config,
    transport: StreamTransport,
    body: String,
    pool: Arc<VoicePool<V>>,
    buffer: Arc<ReassemblyBuffer>,
    events: mpsc::Sender<SessionEvent>,
    state: watch::Sender<SessionState>,
    cancel: CancellationToken,
}

impl<V: VoiceSink + 'static> SessionTask<V> {
    async fn run(self) {
        let (mut transport_rx, _transport_handle) =
            self.transport
                .open(self.body.clone(), &self.cancel, TRANSPORT_CHANNEL_SIZE);

        let (complete_tx, complete_rx) = watch::channel(false);
        let scheduler_cancel = self.cancel.child_token();
        let scheduler = PlaybackScheduler::new(
            self.buffer.clone(),
            self.pool.clone(),
            self.events.clone(),
            self.config.buffer.missing_chunk_wait(),
        );
        let scheduler_task = tokio::spawn(scheduler.run(scheduler_cancel.clone(), complete_rx));

        let mut decoder = MessageDecoder::new(&self.config.stream.line_marker);
        let mut complete_seen = false;

        let outcome = loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break StreamOutcome::Cancelled,
                event = transport_rx.recv() => event,
            };
            match event {
                Some(TransportEvent::Connected) => {
                    self.set_state(SessionState::Streaming);
                }
                Some(TransportEvent::Bytes(fragment)) => {
                    let mut failed = None;
                    for message in decoder.feed(&fragment) {
                        match self.route(message, &complete_tx, &mut complete_seen).await {
                            Routing::Continue => {}
                            Routing::Fatal(error) => {
                                failed = Some(error);
                                break;
                            }
                        }
                    }
                    if let Some(error) = failed {
                        break StreamOutcome::Failed(error);
                    }
                }
                Some(TransportEvent::Closed) => {
                    if !complete_seen {
                        tracing::warn!("stream closed before completion signal, draining anyway");
                        self.set_state(SessionState::Draining);
                        let _ = complete_tx.send(true);
                    }
                    break StreamOutcome::Drained;
                }
                Some(TransportEvent::Failed(e)) => break StreamOutcome::Failed(e),
                None => break StreamOutcome::Drained,
            }
        };

        match outcome {
            StreamOutcome::Drained => {
                // The scheduler finishes once the buffer drains (emitting
                // AllCompleted) or the token fires. Either way it stops
                // the voices itself before returning.
                let _ = scheduler_task.await;
                if self.cancel.is_cancelled() {
                    self.teardown();
                    self.set_state(SessionState::Cancelled);
                } else {
                    self.set_state(SessionState::Completed);
                }
            }
            StreamOutcome::Failed(error) => {
                scheduler_cancel.cancel();
                let _ = scheduler_task.await;
                self.teardown();
                tracing::error!("session failed: {error}");
                let _ = self
                    .events
                    .send(SessionEvent::SessionError {
                        message: error.to_string(),
                    })
                    .await;
                self.set_state(SessionState::Failed);
            }
            StreamOutcome::Cancelled => {
                let _ = scheduler_task.await;
                self.teardown();
                self.set_state(SessionState::Cancelled);
            }
        }
    }

    /// Stops all voices and resets the buffer. Safe to call repeatedly from
    /// any internal state — this is what keeps audio from sticking on.
    fn teardown(&self) {
        self.pool.stop_all();
        self.buffer.reset();
    }

    async fn route(
        &self,
        message: StreamMessage,
        complete_tx: &watch::Sender<bool>,
        complete_seen: &mut bool,
    ) -> Routing {
        match message {
            StreamMessage::Metadata { text, .. } => {
                self.emit(SessionEvent::Metadata { text }).await;
            }
            StreamMessage::Text {
                sequence_id, text, ..
            } => {
                self.emit(SessionEvent::TextGenerated { sequence_id, text })
                    .await;
            }
            StreamMessage::Audio {
                sequence_id,
                text,
                audio_data,
                ..
            } => {
                self.route_audio(sequence_id, text, &audio_data).await;
            }
            StreamMessage::SentenceComplete { sequence_id, .. } => {
                tracing::debug!("sentence {sequence_id} complete");
            }
            StreamMessage::Complete {
                total_sentences, ..
            } => {
                tracing::debug!("generation complete, total sentences: {total_sentences:?}");
                *complete_seen = true;
                self.set_state(SessionState::Draining);
                let _ = complete_tx.send(true);
            }
            StreamMessage::Error { message, .. } => {
                return Routing::Fatal(VoxtalkError::ServerReported { message });
            }
        }
        Routing::Continue
    }

    /// Decodes a chunk's base64 container and queues it for playback. Any
    /// per-chunk decode failure is surfaced as a `Warning` and the chunk is
    /// dropped; the session keeps going.
    async fn route_audio(&self, sequence_id: u64, text: String, audio_data: &str) {
        let audio = BASE64
            .decode(audio_data.as_bytes())
            .map_err(|e| VoxtalkError::PayloadDecode {
                sequence_id,
                message: format!("invalid base64: {e}"),
            })
            .and_then(|payload| pcm::decode(sequence_id, &payload));
        let audio = match audio {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!("{e}");
                self.emit(SessionEvent::Warning {
                    message: format!("dropped chunk {sequence_id}: {e}"),
                })
                .await;
                return;
            }
        };

        let chunk = AudioChunk::new(
            sequence_id,
            audio.samples,
            audio.sample_rate,
            audio.channels,
            text,
        );

        if let Some(dir) = &self.config.playback.dump_dir {
            if let Err(e) = wav::dump_chunk(dir, &chunk) {
                tracing::warn!("failed to dump chunk {sequence_id}: {e}");
            }
        }

        self.buffer.add(chunk);
    }

    async fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event).await;
    }

    fn set_state(&self, state: SessionState) {
        let _ = self.state.send(state);
    }
}

enum Routing {
    Continue,
    Fatal(VoxtalkError),
}
