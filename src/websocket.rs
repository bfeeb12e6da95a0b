//! # WebSocket Gateway
//!
//! One actor per device connection. The actor owns the connection's
//! [`Session`] and is the only thing that touches it, so every state change
//! for a connection happens on one task in arrival order.
//!
//! ## Message Flow:
//! 1. A text or binary frame arrives and is decoded into an `InboundEvent`
//! 2. The session applies it and answers with a `Dispatch`
//! 3. Immediate replies are written straight back
//! 4. A pipeline run is spawned onto the runtime; when it finishes it sends
//!    its `OutboundEvent` back to the actor as a `Deliver` message
//!
//! ## Key Rust Concepts:
//! - **Actor model**: `RelaySocket` handles one message at a time, no locks
//!   needed around the session
//! - **StreamHandler**: Receives WebSocket frames from the client
//! - **Addr::do_send**: Hands the pipeline result back to the actor from the
//!   spawned task. If the connection has closed meanwhile the message is
//!   dropped, which is exactly what happens to a late reply.

use crate::error::ErrorKind;
use crate::session::events::DecodeError;
use crate::session::{Dispatch, InboundEvent, OutboundEvent, Session};
use crate::state::{AppState, RelayMetrics};
use actix::prelude::*;
use actix_http::ws::Item;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub struct RelaySocket {
    connection_id: Uuid,
    session: Session,
    metrics: Arc<RelayMetrics>,
    heartbeat_interval: Duration,
    client_timeout: Duration,
    last_heartbeat: Instant,
}

/// A finished pipeline's event, sent back to the actor that started it.
#[derive(Message)]
#[rtype(result = "()")]
struct Deliver(OutboundEvent);

impl RelaySocket {
    pub fn new(state: &AppState) -> Self {
        let connection_id = Uuid::new_v4();
        Self {
            connection_id,
            session: Session::new(
                connection_id,
                state.pipeline.clone(),
                state.config.session.max_image_bytes,
            ),
            metrics: state.metrics.clone(),
            heartbeat_interval: state.config.session.heartbeat_interval(),
            client_timeout: state.config.session.client_timeout(),
            last_heartbeat: Instant::now(),
        }
    }

    fn send(&self, ctx: &mut ws::WebsocketContext<Self>, event: &OutboundEvent) {
        match serde_json::to_string(event) {
            Ok(json) => {
                debug!(connection_id = %self.connection_id, event = event.name(), "Sending event");
                ctx.text(json);
            }
            Err(err) => {
                error!(connection_id = %self.connection_id, error = %err, "Failed to serialize event");
            }
        }
    }

    fn reject_frame(&mut self, err: DecodeError, ctx: &mut ws::WebsocketContext<Self>) {
        self.metrics.decode_failed();
        warn!(connection_id = %self.connection_id, error = %err.message, "Undecodable frame");
        if err.aborts_upload() {
            self.session.abort_upload(err.last_chunk);
        }
        self.send(ctx, &err.into_event());
    }

    fn dispatch(&mut self, event: InboundEvent, ctx: &mut ws::WebsocketContext<Self>) {
        debug!(connection_id = %self.connection_id, event = event.name(), "Received event");

        match self.session.handle(event) {
            Dispatch::Reply(reply) => {
                match &reply {
                    OutboundEvent::Error { kind: ErrorKind::Busy, .. } => self.metrics.busy_rejected(),
                    OutboundEvent::ImageReceived { .. } => self.metrics.image_received(),
                    _ => {}
                }
                self.send(ctx, &reply);
            }
            Dispatch::Quiet => {}
            Dispatch::Run(pipeline) => {
                self.metrics.pipeline_started();
                let metrics = self.metrics.clone();
                let addr = ctx.address();

                tokio::spawn(async move {
                    let event = pipeline.await;
                    if matches!(event, OutboundEvent::Error { .. }) {
                        metrics.pipeline_failed();
                    }
                    addr.do_send(Deliver(event));
                });
            }
        }
    }
}

impl Actor for RelaySocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.metrics.connection_opened();
        info!(connection_id = %self.connection_id, "WebSocket connection started");

        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > act.client_timeout {
                warn!(connection_id = %act.connection_id, "WebSocket heartbeat timeout, closing connection");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.metrics.connection_closed();
        info!(
            connection_id = %self.connection_id,
            busy = self.session.is_busy(),
            "WebSocket connection stopped"
        );
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for RelaySocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                match InboundEvent::from_text(&text) {
                    Ok(event) => self.dispatch(event, ctx),
                    Err(err) => self.reject_frame(err, ctx),
                }
            }
            Ok(ws::Message::Binary(data)) => {
                self.last_heartbeat = Instant::now();
                match InboundEvent::from_binary(&data) {
                    Ok(event) => self.dispatch(event, ctx),
                    Err(err) => self.reject_frame(err, ctx),
                }
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(connection_id = %self.connection_id, reason = ?reason, "WebSocket closed by client");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(item)) => {
                self.last_heartbeat = Instant::now();
                // One error per fragmented message, on its first frame.
                if matches!(item, Item::FirstText(_) | Item::FirstBinary(_)) {
                    warn!(connection_id = %self.connection_id, "Fragmented message rejected");
                    self.metrics.decode_failed();
                    self.send(
                        ctx,
                        &OutboundEvent::error(
                            ErrorKind::TextProcessing,
                            "fragmented messages are not supported, send each event in one frame",
                        ),
                    );
                }
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(connection_id = %self.connection_id, error = %err, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}

impl Handler<Deliver> for RelaySocket {
    type Result = ();

    fn handle(&mut self, msg: Deliver, ctx: &mut Self::Context) {
        self.send(ctx, &msg.0);
    }
}

/// `GET /ws`: upgrade to a relay session.
pub async fn relay_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let socket = RelaySocket::new(&state);
    info!(
        connection_id = %socket.connection_id,
        peer = ?req.connection_info().peer_addr(),
        "New WebSocket connection request"
    );

    ws::WsResponseBuilder::new(socket, &req, stream)
        .frame_size(state.config.server.max_frame_bytes)
        .start()
}
