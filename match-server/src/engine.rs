//! The single event loop of the server.
//!
//! One tokio task owns the [`Registry`], every [`Session`] and every timer handle. Socket
//! tasks and timer tasks only talk to it through [`Event`]s, so each event is processed to
//! completion before the next one starts and no match state is ever shared between tasks.
//!
//! ```text
//! [socket receive task] --Inbound--> [engine] --try_send--> [socket send task]
//! [timer task] --------TimerFired--> [engine] --spawn/abort--> [timer task]
//! ```

use crate::outbox::{Envelope, Outbox, SessionId, TimerCommand, TimerId, TimerKind};
use crate::registry::Registry;
use crate::session::Session;
use protocol::{CHANNEL_BUFFER_SIZE, ClientMessage, ServerMessage};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::error::{SendError, TrySendError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;

/// Everything the engine reacts to.
#[derive(Debug)]
pub enum Event {
    /// A new connection with the channel its send task reads from.
    Connected {
        session: SessionId,
        outbound: mpsc::Sender<ServerMessage>,
    },
    /// A well formed message of a connection.
    Inbound {
        session: SessionId,
        message: ClientMessage,
    },
    /// The connection is gone.
    Disconnected { session: SessionId },
    /// A timer ran out.
    TimerFired { timer: TimerId },
    /// Request for the match listing.
    Enlist { reply: oneshot::Sender<String> },
}

/// The cloneable entry point to the engine.
#[derive(Clone, Debug)]
pub struct EngineHandle {
    events: mpsc::Sender<Event>,
    next_session: Arc<AtomicU64>,
}

impl EngineHandle {
    /// Hands out a session id that was never used before.
    pub fn new_session(&self) -> SessionId {
        self.next_session.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn send(&self, event: Event) -> Result<(), SendError<Event>> {
        self.events.send(event).await
    }
}

/// A connected session and the way to reach its socket.
struct Connection {
    session: Session,
    /// Dropped once the client stops keeping up, which closes the socket.
    outbound: Option<mpsc::Sender<ServerMessage>>,
}

/// A scheduled timer and where its tick goes.
struct PendingTimer {
    match_name: String,
    kind: TimerKind,
    handle: AbortHandle,
}

struct Engine {
    registry: Registry,
    connections: HashMap<SessionId, Connection>,
    timers: HashMap<TimerId, PendingTimer>,
    outbox: Outbox,
    /// Used by timer tasks to report back.
    events: mpsc::Sender<Event>,
}

/// Moves the registry into a new engine task and returns the handle to reach it.
pub fn spawn_engine(registry: Registry) -> EngineHandle {
    launch(registry, HashMap::new())
}

fn launch(registry: Registry, connections: HashMap<SessionId, Connection>) -> EngineHandle {
    let (events, receiver) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    let next_session = connections.keys().max().map_or(1, |last| last + 1);
    let engine = Engine {
        registry,
        connections,
        timers: HashMap::new(),
        outbox: Outbox::new(),
        events: events.clone(),
    };
    tokio::spawn(engine.run(receiver));
    EngineHandle {
        events,
        next_session: Arc::new(AtomicU64::new(next_session)),
    }
}

impl Engine {
    async fn run(mut self, mut receiver: mpsc::Receiver<Event>) {
        while let Some(event) = receiver.recv().await {
            self.handle_event(event);
            self.flush();
        }
        // Cannot happen while we hold a sender ourselves.
        tracing::error!("Engine event channel closed.");
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Connected { session, outbound } => {
                self.connections.insert(
                    session,
                    Connection {
                        session: Session::new(session),
                        outbound: Some(outbound),
                    },
                );
            }
            Event::Inbound { session, message } => {
                let Some(connection) = self.connections.get_mut(&session) else {
                    tracing::warn!(session, "Message from an unknown session.");
                    return;
                };
                connection
                    .session
                    .handle(message, &mut self.registry, &mut self.outbox);
            }
            Event::Disconnected { session } => {
                if let Some(mut connection) = self.connections.remove(&session) {
                    connection
                        .session
                        .close(&mut self.registry, &mut self.outbox);
                }
            }
            Event::TimerFired { timer } => {
                // A cancelled timer may still have its tick queued, it is not in the map anymore.
                if let Some(pending) = self.timers.remove(&timer) {
                    self.registry
                        .fire_timer(&pending.match_name, pending.kind, timer, &mut self.outbox);
                }
            }
            Event::Enlist { reply } => {
                let _ = reply.send(self.registry.describe());
            }
        }
    }

    /// Applies the effects collected while handling the last event.
    fn flush(&mut self) {
        let (envelopes, timer_commands) = self.outbox.take();
        for command in timer_commands {
            self.apply_timer_command(command);
        }
        for envelope in envelopes {
            self.deliver(envelope);
        }
    }

    fn apply_timer_command(&mut self, command: TimerCommand) {
        match command {
            TimerCommand::Start {
                timer,
                match_name,
                kind,
                delay,
            } => {
                let events = self.events.clone();
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(Event::TimerFired { timer }).await;
                })
                .abort_handle();
                self.timers.insert(
                    timer,
                    PendingTimer {
                        match_name,
                        kind,
                        handle,
                    },
                );
            }
            TimerCommand::Cancel { timer } => {
                if let Some(pending) = self.timers.remove(&timer) {
                    pending.handle.abort();
                }
            }
        }
    }

    /// Hands a message to the send task of its session without waiting.
    fn deliver(&mut self, envelope: Envelope) {
        let Some(connection) = self.connections.get_mut(&envelope.to) else {
            tracing::debug!(session = envelope.to, "Dropping message for a closed session.");
            return;
        };
        let Some(outbound) = &connection.outbound else {
            return;
        };
        match outbound.try_send(envelope.message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(session = envelope.to, "Outbound queue full - client too slow.");
                connection.outbound = None;
            }
            Err(TrySendError::Closed(_)) => {
                connection.outbound = None;
            }
        }
    }
}
