//! # Session State Machine
//!
//! Per-connection state and the rules for what each inbound event does to it.
//!
//! ## State:
//! - **image**: The last fully reassembled image, replaced wholesale
//! - **assembly**: Image chunks received since the last terminal chunk
//! - **busy**: Set while a pipeline runs for this connection
//!
//! ## Transitions:
//! - `audio_full` / `text_message` while Idle: admit, capture the current
//!   image, hand back a pipeline future. Busy returns to false when that
//!   future finishes, whichever way it finishes.
//! - `audio_full` / `text_message` while Processing: reject with `busy`.
//!   Nothing is queued.
//! - `image_chunk`: always accepted, a running pipeline does not block it.
//!   Once an upload has been rejected (too large, undecodable chunk) the rest
//!   of that upload is dropped up to and including its terminal chunk, and
//!   the held image is left as it was.
//! - `clear_image`: drop the held image.
//!
//! ## Rust Concepts:
//! - **Arc<AtomicBool>**: The flag is shared with the spawned pipeline task
//! - **RAII guard**: `FlightGuard` clears the flag in `Drop`, so success,
//!   error and panic all release it
//! - **catch_unwind**: A panicking pipeline still yields an `error` event
//! - **Arc<[u8]>**: A pipeline keeps the image it captured even if the device
//!   replaces or clears it meanwhile

use crate::error::{ErrorKind, RelayError, RelayResult};
use crate::session::events::{ImageChunk, InboundEvent, OutboundEvent};
use crate::session::pipeline::{Pipeline, Turn};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Clears the busy flag when dropped.
#[derive(Debug)]
pub struct FlightGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// What the gateway should do after an event was applied.
pub enum Dispatch {
    /// Send this event now.
    Reply(OutboundEvent),
    /// Nothing to send (a non-terminal image chunk).
    Quiet,
    /// Drive this future to completion and send what it yields.
    Run(BoxFuture<'static, OutboundEvent>),
}

pub struct Session {
    connection_id: Uuid,
    image: Option<Arc<[u8]>>,
    assembly: Vec<Vec<u8>>,
    assembly_bytes: usize,
    /// Set after a rejected chunk until the upload's terminal chunk arrives.
    discarding: bool,
    max_image_bytes: usize,
    busy: Arc<AtomicBool>,
    pipeline: Arc<Pipeline>,
}

impl Session {
    pub fn new(connection_id: Uuid, pipeline: Arc<Pipeline>, max_image_bytes: usize) -> Self {
        Self {
            connection_id,
            image: None,
            assembly: Vec::new(),
            assembly_bytes: 0,
            discarding: false,
            max_image_bytes,
            busy: Arc::new(AtomicBool::new(false)),
            pipeline,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn image(&self) -> Option<Arc<[u8]>> {
        self.image.clone()
    }

    pub fn pending_chunks(&self) -> usize {
        self.assembly.len()
    }

    /// Claim the single-flight slot.
    pub fn try_admit(&self) -> RelayResult<FlightGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| FlightGuard {
                busy: self.busy.clone(),
            })
            .map_err(|_| RelayError::Busy)
    }

    /// Buffer one image fragment. Returns the image size once the terminal
    /// chunk has been folded into `image`.
    /// Chunks of an upload that was already rejected are dropped silently.
    pub fn append_chunk(&mut self, chunk: ImageChunk) -> RelayResult<Option<usize>> {
        if self.discarding {
            self.discarding = !chunk.is_last;
            debug!(
                connection_id = %self.connection_id,
                terminal = chunk.is_last,
                "Dropped chunk of rejected upload"
            );
            return Ok(None);
        }

        let total = self.assembly_bytes + chunk.chunk.len();
        if total > self.max_image_bytes {
            self.abort_upload(chunk.is_last);
            return Err(RelayError::ImageUpload(format!(
                "image exceeds {} bytes",
                self.max_image_bytes
            )));
        }

        self.assembly_bytes = total;
        self.assembly.push(chunk.chunk);

        if !chunk.is_last {
            return Ok(None);
        }

        let image = self.assembly.concat();
        self.reset_assembly();
        if image.is_empty() {
            return Err(RelayError::ImageUpload("image is empty".to_string()));
        }

        let size = image.len();
        self.image = Some(Arc::from(image));
        Ok(Some(size))
    }

    pub fn clear_image(&mut self) {
        self.image = None;
    }

    /// Throw away the partial image. Unless the failed chunk was the
    /// terminal one, the remaining chunks of this upload will be dropped.
    pub fn abort_upload(&mut self, was_last: bool) {
        self.reset_assembly();
        self.discarding = !was_last;
    }

    pub fn is_discarding(&self) -> bool {
        self.discarding
    }

    fn reset_assembly(&mut self) {
        self.assembly.clear();
        self.assembly_bytes = 0;
    }

    /// Apply one inbound event.
    pub fn handle(&mut self, event: InboundEvent) -> Dispatch {
        match event {
            InboundEvent::AudioFull(audio) => self.start_turn(Turn::Audio(audio)),
            InboundEvent::TextMessage(text) => self.start_turn(Turn::Text(text)),
            InboundEvent::ImageChunk(chunk) => match self.append_chunk(chunk) {
                Ok(Some(size)) => {
                    info!(connection_id = %self.connection_id, size, "Image reassembled");
                    Dispatch::Reply(OutboundEvent::image_received(size))
                }
                Ok(None) => {
                    debug!(
                        connection_id = %self.connection_id,
                        chunks = self.assembly.len(),
                        bytes = self.assembly_bytes,
                        "Image chunk buffered"
                    );
                    Dispatch::Quiet
                }
                Err(err) => {
                    warn!(connection_id = %self.connection_id, error = %err, "Image upload rejected");
                    Dispatch::Reply(OutboundEvent::error(ErrorKind::ImageUpload, err.to_string()))
                }
            },
            InboundEvent::ClearImage => {
                self.clear_image();
                debug!(connection_id = %self.connection_id, "Image cleared");
                Dispatch::Reply(OutboundEvent::ImageCleared)
            }
        }
    }

    fn start_turn(&mut self, turn: Turn) -> Dispatch {
        let guard = match self.try_admit() {
            Ok(guard) => guard,
            Err(err) => {
                debug!(connection_id = %self.connection_id, "Rejected turn while busy");
                return Dispatch::Reply(OutboundEvent::error(ErrorKind::Busy, err.to_string()));
            }
        };

        let origin = turn.origin();
        let image = self.image.clone();
        let pipeline = self.pipeline.clone();
        let connection_id = self.connection_id;

        Dispatch::Run(
            async move {
                let event = AssertUnwindSafe(pipeline.respond(connection_id, turn, image))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        error!(connection_id = %connection_id, "Pipeline panicked");
                        OutboundEvent::error(origin, "internal error while processing the request")
                    });
                drop(guard);
                event
            }
            .boxed(),
        )
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!(
            connection_id = %self.connection_id,
            had_image = self.image.is_some(),
            pending_chunks = self.assembly.len(),
            "Session discarded"
        );
    }
}
