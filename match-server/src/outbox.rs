//! Collects everything a match operation wants to happen outside of the match:
//! messages to sessions and timers to start or cancel. The event loop drains it
//! after every event, which keeps the game logic free of sockets and runtimes.

use protocol::ServerMessage;
use std::mem;
use std::time::Duration;

/// Identifies one live connection.
pub type SessionId = u64;
/// Identifies one scheduled timer. Ids are never reused.
pub type TimerId = u64;

/// The timers a match may have running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// One shot, announces the seed rows after the start delay.
    Opening,
    /// Recurring, drops the front obstacle batch onto the receiving board.
    Delivery,
}

/// A request to the event loop concerning timers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerCommand {
    /// Fire `timer` for the named match after `delay`.
    Start {
        timer: TimerId,
        match_name: String,
        kind: TimerKind,
        delay: Duration,
    },
    /// Forget `timer`. A tick that is already on its way gets dropped.
    Cancel { timer: TimerId },
}

/// A message addressed to one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// The receiving session.
    pub to: SessionId,
    /// The message itself.
    pub message: ServerMessage,
}

/// The pending effects of the events processed so far.
#[derive(Debug, Default)]
pub struct Outbox {
    envelopes: Vec<Envelope>,
    timer_commands: Vec<TimerCommand>,
    next_timer: TimerId,
}

impl Outbox {
    pub fn new() -> Self {
        Outbox::default()
    }

    /// Queues a message for a session.
    pub fn send(&mut self, to: SessionId, message: ServerMessage) {
        self.envelopes.push(Envelope { to, message });
    }

    /// Schedules a timer and hands out its id.
    pub fn start_timer(&mut self, match_name: &str, kind: TimerKind, delay: Duration) -> TimerId {
        self.next_timer += 1;
        let timer = self.next_timer;
        self.timer_commands.push(TimerCommand::Start {
            timer,
            match_name: match_name.to_owned(),
            kind,
            delay,
        });
        timer
    }

    /// Cancels a timer handed out earlier.
    pub fn cancel_timer(&mut self, timer: TimerId) {
        self.timer_commands.push(TimerCommand::Cancel { timer });
    }

    /// Takes all pending effects, leaving the outbox empty. Timer ids keep counting.
    pub fn take(&mut self) -> (Vec<Envelope>, Vec<TimerCommand>) {
        (
            mem::take(&mut self.envelopes),
            mem::take(&mut self.timer_commands),
        )
    }

    /// Takes only the messages, for callers that do not care about timers.
    #[cfg(test)]
    pub fn take_envelopes(&mut self) -> Vec<Envelope> {
        self.take().0
    }
}
