//! Duplex streaming session with the remote speech model
//!
//! One WebSocket connection per voice interaction. Outbound PCM chunks
//! become realtime media messages; inbound server content is decoded to
//! PCM packets. Lifecycle is surfaced as an ordered event stream: `Open`
//! once, `Audio` zero or more times, then at most one `Error` followed
//! by a final `Closed`. Transport faults are not retried here; that
//! policy belongs to the controller.

pub mod wire;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::audio::codec::{self, EncodedChunk, InboundAudioPacket, PLAYBACK_SAMPLE_RATE};
use crate::queue::BoundedQueue;
use crate::{Error, Result};

/// Outbound chunks buffered before the oldest is dropped.
///
/// Stale audio is worthless to a realtime model, so backpressure drops
/// from the front rather than blocking the capture path.
const OUTBOUND_CAPACITY: usize = 32;

/// Events buffered for the consumer
const EVENT_CAPACITY: usize = 64;

/// Connection parameters for one live session
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// WebSocket endpoint (without the key query parameter)
    pub endpoint: String,
    /// API key appended as a query parameter
    pub api_key: String,
    /// Target speech model identifier
    pub model: String,
    /// System prompt for the session
    pub system_instruction: String,
    /// Synthesized voice identifier
    pub voice: String,
    /// Response modality, "AUDIO" for voice sessions
    pub response_modality: String,
}

/// Session lifecycle events, in emission order
#[derive(Debug)]
pub enum SessionEvent {
    /// Connection established and setup acknowledged; sends are valid
    Open,
    /// A decoded audio packet arrived
    Audio(InboundAudioPacket),
    /// The model was interrupted; queued playback is stale
    Interrupted,
    /// Transport or protocol fault; the session is over
    Error(String),
    /// Connection terminated; no more events follow
    Closed,
}

/// One duplex connection to the speech model
pub struct StreamingSession {
    id: uuid::Uuid,
    outbound: Arc<BoundedQueue<EncodedChunk>>,
    open: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl StreamingSession {
    /// Open the connection and send the setup message.
    ///
    /// Resolves once the transport handshake completes; readiness for
    /// sends is signaled separately by `SessionEvent::Open`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Connection` if the handshake or setup send fails.
    pub async fn connect(
        config: &LiveConfig,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>)> {
        let mut url = url::Url::parse(&config.endpoint)
            .map_err(|e| Error::Config(format!("invalid endpoint: {e}")))?;
        url.query_pairs_mut().append_pair("key", &config.api_key);

        let id = uuid::Uuid::new_v4();
        tracing::debug!(session = %id, model = %config.model, "connecting");

        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        let (mut sink, mut stream) = ws.split();

        let setup = serde_json::to_string(&wire::setup_message(config))?;
        sink.send(Message::Text(setup))
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        let outbound = Arc::new(BoundedQueue::new(OUTBOUND_CAPACITY));
        let open = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));

        let writer = {
            let outbound = Arc::clone(&outbound);
            tokio::spawn(async move {
                while let Some(chunk) = outbound.pop().await {
                    let message = match serde_json::to_string(&wire::media_message(&chunk)) {
                        Ok(m) => m,
                        Err(e) => {
                            tracing::warn!(error = %e, "chunk serialization failed");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(message)).await {
                        tracing::warn!(error = %e, "outbound send failed");
                        break;
                    }
                }
                // Queue closed or sink broken: release the transport
                let _ = sink.send(Message::Close(None)).await;
                let _ = sink.close().await;
            })
        };

        let reader = {
            let events = events_tx;
            let open = Arc::clone(&open);
            let closed = Arc::clone(&closed);
            tokio::spawn(async move {
                let mut announced_open = false;

                while let Some(incoming) = stream.next().await {
                    match incoming {
                        Ok(Message::Text(text)) => {
                            handle_payload(text.as_bytes(), &events, &open, &mut announced_open)
                                .await;
                        }
                        Ok(Message::Binary(bytes)) => {
                            handle_payload(&bytes, &events, &open, &mut announced_open).await;
                        }
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {}
                        Err(e) => {
                            let _ = events.send(SessionEvent::Error(e.to_string())).await;
                            break;
                        }
                    }
                }

                open.store(false, Ordering::SeqCst);
                closed.store(true, Ordering::SeqCst);
                let _ = events.send(SessionEvent::Closed).await;
            })
        };

        Ok((
            Self {
                id,
                outbound,
                open,
                closed,
                reader,
                writer,
            },
            events_rx,
        ))
    }

    /// Enqueue an outbound audio chunk.
    ///
    /// Never blocks; a saturated queue evicts its oldest chunk.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotReady` before `SessionEvent::Open` and
    /// `Error::SessionClosed` after close; sending outside the open
    /// window is an error, never a silent no-op.
    pub fn send(&self, chunk: EncodedChunk) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::SessionClosed);
        }
        if !self.open.load(Ordering::SeqCst) {
            return Err(Error::NotReady);
        }
        if !self.outbound.push(chunk) {
            return Err(Error::SessionClosed);
        }
        Ok(())
    }

    /// Close the session and release the transport.
    ///
    /// Idempotent. The writer drains buffered chunks, sends a close
    /// frame, and shuts the socket; the reader is stopped.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.open.store(false, Ordering::SeqCst);
        self.outbound.close();
        self.reader.abort();
        tracing::debug!(session = %self.id, "session closed");
    }

    /// Whether the open window is active (between Open and close)
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }

    /// Chunks evicted by outbound backpressure so far
    #[must_use]
    pub fn dropped_chunks(&self) -> u64 {
        self.outbound.dropped()
    }

    /// Session identifier for log correlation
    #[must_use]
    pub const fn id(&self) -> uuid::Uuid {
        self.id
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        self.close();
        self.writer.abort();
    }
}

/// Parse one inbound payload and emit the matching events.
///
/// A payload that fails to parse or decode is dropped and logged; one
/// bad packet never takes the session down.
async fn handle_payload(
    payload: &[u8],
    events: &mpsc::Sender<SessionEvent>,
    open: &AtomicBool,
    announced_open: &mut bool,
) {
    let message: wire::ServerMessage = match serde_json::from_slice(payload) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable server message dropped");
            return;
        }
    };

    if message.is_setup_complete() && !*announced_open {
        *announced_open = true;
        open.store(true, Ordering::SeqCst);
        let _ = events.send(SessionEvent::Open).await;
    }

    if message.is_interrupted() {
        let _ = events.send(SessionEvent::Interrupted).await;
    }

    if let Some(blob) = message.inline_audio() {
        match codec::decode_chunk(&blob.data, PLAYBACK_SAMPLE_RATE) {
            Ok(packet) => {
                let _ = events.send(SessionEvent::Audio(packet)).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "malformed audio packet dropped");
            }
        }
    }
}
