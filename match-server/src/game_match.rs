//! One running game between a host and a guest.
//!
//! The match owns both boards, the obstacle queue and the ids of its timers. Every
//! operation checks the status first and reports its effects through the [`Outbox`],
//! so a match that reached [`MatchStatus::Finished`] can never be mutated again.
//!
//! ```text
//! [Waiting] --join--> [Playing] --surrender / overflow--> [Finished]
//! [Waiting] --close-------------------------------------> [Finished]
//! ```

use crate::board::{Board, CellPosition};
use crate::line_generator::new_line;
use crate::outbox::{Outbox, SessionId, TimerId, TimerKind};
use protocol::{Row, ServerMessage};
use rand::Rng;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// The triangular score of a move is divided by this to get obstacle rows.
pub const POINTS_PER_OBSTACLE_ROW: u32 = 50;

/// The two seats of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Host,
    Guest,
}

impl Side {
    /// Both sides, host first.
    pub const BOTH: [Side; 2] = [Side::Host, Side::Guest];

    pub fn opponent(self) -> Side {
        match self {
            Side::Host => Side::Guest,
            Side::Guest => Side::Host,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    /// Only the host is present.
    Waiting,
    /// Both players are present and moves are accepted.
    Playing,
    /// Terminal. The registry drops the match in the same event.
    Finished,
}

/// The delays that drive a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchTimings {
    /// Time between the start and the announcement of the seed rows.
    pub start_delay: Duration,
    /// Period of the obstacle delivery.
    pub delivery_interval: Duration,
}

impl Default for MatchTimings {
    fn default() -> Self {
        MatchTimings {
            start_delay: Duration::from_millis(5000),
            delivery_interval: Duration::from_millis(3000),
        }
    }
}

/// A move as the client reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    pub x: i32,
    pub y: i32,
    /// Void cells the client sees in column x.
    pub claimed_empty_count: u32,
}

/// Why a move was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveRejected {
    /// There is no match under the name.
    UnknownMatch,
    /// The match is not running.
    NotPlaying,
    /// The session does not hold the side it claims.
    NotParticipant,
    /// The target cell is not on the board.
    OutOfBounds,
    /// The client sees a different column than the server.
    Desync {
        /// Void cells the client reported.
        claimed: u32,
        /// Void cells on the server board.
        actual: u32,
    },
    /// The target cell was already void.
    NothingRemoved,
}

impl fmt::Display for MoveRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveRejected::UnknownMatch => write!(f, "unknown match"),
            MoveRejected::NotPlaying => write!(f, "match is not playing"),
            MoveRejected::NotParticipant => write!(f, "session does not hold that side"),
            MoveRejected::OutOfBounds => write!(f, "target is off the board"),
            MoveRejected::Desync { claimed, actual } => {
                write!(f, "column out of sync: claimed {claimed} empty, server has {actual}")
            }
            MoveRejected::NothingRemoved => write!(f, "target cell is void"),
        }
    }
}

impl std::error::Error for MoveRejected {}

/// The state of one seat.
#[derive(Debug)]
struct Player {
    /// None only for the guest seat while waiting.
    session: Option<SessionId>,
    board: Board,
    /// Scoring points below one obstacle row, carried between moves.
    obstacle_points: u32,
}

impl Player {
    fn new(session: Option<SessionId>) -> Self {
        Player {
            session,
            board: Board::new(),
            obstacle_points: 0,
        }
    }

    /// Adds the triangular value of the score and returns the whole rows it completes.
    fn accrue(&mut self, score: u32) -> u32 {
        self.obstacle_points += score * (score + 1) / 2;
        let rows = self.obstacle_points / POINTS_PER_OBSTACLE_ROW;
        self.obstacle_points %= POINTS_PER_OBSTACLE_ROW;
        rows
    }
}

/// A match between two sessions.
#[derive(Debug)]
pub struct Match {
    name: String,
    status: MatchStatus,
    players: [Player; 2],
    /// Pending batch sizes, front is delivered next. Non-empty iff an owner is set.
    obstacle_queue: VecDeque<u32>,
    /// The attacking side. Its opponent receives the queue.
    obstacle_owner: Option<Side>,
    /// The seed rows, kept until the opening timer announces them.
    opening_rows: Option<[Row; 2]>,
    opening_timer: Option<TimerId>,
    delivery_timer: Option<TimerId>,
    timings: MatchTimings,
}

impl Match {
    /// Creates a waiting match for the host.
    pub fn new(name: &str, host: SessionId, timings: MatchTimings) -> Self {
        Match {
            name: name.to_owned(),
            status: MatchStatus::Waiting,
            players: [Player::new(Some(host)), Player::new(None)],
            obstacle_queue: VecDeque::new(),
            obstacle_owner: None,
            opening_rows: None,
            opening_timer: None,
            delivery_timer: None,
            timings,
        }
    }

    pub fn status(&self) -> MatchStatus {
        self.status
    }

    pub fn is_finished(&self) -> bool {
        self.status == MatchStatus::Finished
    }

    pub fn board(&self, side: Side) -> &Board {
        &self.players[side.index()].board
    }

    pub fn session(&self, side: Side) -> Option<SessionId> {
        self.players[side.index()].session
    }

    /// Checks if the session sits on the side.
    pub fn holds(&self, side: Side, session: SessionId) -> bool {
        self.session(side) == Some(session)
    }

    #[cfg(test)]
    pub fn obstacle_owner(&self) -> Option<Side> {
        self.obstacle_owner
    }

    pub fn pending_obstacles(&self) -> Vec<u32> {
        self.obstacle_queue.iter().copied().collect()
    }

    fn send(&self, side: Side, message: ServerMessage, outbox: &mut Outbox) {
        if let Some(session) = self.session(side) {
            outbox.send(session, message);
        }
    }

    /// Seats the guest and starts the game. Both boards get a seed row at the floor,
    /// announced only after the start delay.
    pub fn join<R: Rng>(&mut self, guest: SessionId, rng: &mut R, outbox: &mut Outbox) -> bool {
        if self.status != MatchStatus::Waiting {
            return false;
        }
        self.status = MatchStatus::Playing;
        self.players[Side::Guest.index()].session = Some(guest);
        for side in Side::BOTH {
            self.send(side, ServerMessage::Start, outbox);
        }

        let rows = [new_line(rng, false), new_line(rng, false)];
        for side in Side::BOTH {
            self.players[side.index()]
                .board
                .push_rows(&[rows[side.index()]]);
        }
        self.opening_rows = Some(rows);
        self.opening_timer = Some(outbox.start_timer(
            &self.name,
            TimerKind::Opening,
            self.timings.start_delay,
        ));
        true
    }

    /// Closes a match nobody has joined yet.
    pub fn close(&mut self, outbox: &mut Outbox) -> bool {
        if self.status != MatchStatus::Waiting {
            return false;
        }
        self.finish(outbox);
        true
    }

    /// Applies one move of a side. On success returns the number of removed cells.
    pub fn remove_block<R: Rng>(
        &mut self,
        side: Side,
        request: Move,
        rng: &mut R,
        outbox: &mut Outbox,
    ) -> Result<u32, MoveRejected> {
        let Move {
            x,
            y,
            claimed_empty_count,
        } = request;
        if self.status != MatchStatus::Playing {
            return Err(MoveRejected::NotPlaying);
        }
        let position = CellPosition { x, y };
        if !position.is_valid() {
            return Err(MoveRejected::OutOfBounds);
        }

        let player = &mut self.players[side.index()];
        let actual = player.board.empty_count(x as usize);
        if actual != claimed_empty_count {
            return Err(MoveRejected::Desync {
                claimed: claimed_empty_count,
                actual,
            });
        }
        let score = player.board.remove_chain(position);
        if score == 0 {
            return Err(MoveRejected::NothingRemoved);
        }

        let line = new_line(rng, false);
        player.board.push_rows(&[line]);
        self.send(
            side,
            ServerMessage::Remove {
                x,
                y,
                empty_count: claimed_empty_count,
            },
            outbox,
        );
        self.send(side, ServerMessage::Addition { board: vec![line] }, outbox);

        let player = &mut self.players[side.index()];
        player.board.collapse();
        let earned = player.accrue(score);
        let owner_changed = self.queue_obstacles(side, earned);
        self.announce_obstacles(outbox);

        if self.judge(outbox) {
            return Ok(score);
        }
        if owner_changed {
            self.restart_delivery(outbox);
        }
        Ok(score)
    }

    /// Gives the game to the opponent.
    pub fn surrender(&mut self, side: Side, outbox: &mut Outbox) -> bool {
        if self.status != MatchStatus::Playing {
            return false;
        }
        self.send(side, ServerMessage::Lose, outbox);
        self.send(side.opponent(), ServerMessage::Win, outbox);
        tracing::info!(match_name = %self.name, ?side, "Surrendered.");
        self.finish(outbox);
        true
    }

    /// Handles a timer tick. Ticks of timers the match no longer waits for are dropped.
    pub fn fire_timer<R: Rng>(
        &mut self,
        kind: TimerKind,
        timer: TimerId,
        rng: &mut R,
        outbox: &mut Outbox,
    ) {
        if self.status != MatchStatus::Playing {
            return;
        }
        match kind {
            TimerKind::Opening => {
                if self.opening_timer != Some(timer) {
                    return;
                }
                self.opening_timer = None;
                if let Some(rows) = self.opening_rows.take() {
                    for side in Side::BOTH {
                        let board = vec![rows[side.index()]];
                        self.send(side, ServerMessage::Addition { board }, outbox);
                    }
                }
            }
            TimerKind::Delivery => {
                if self.delivery_timer != Some(timer) {
                    return;
                }
                self.delivery_timer = None;
                self.deliver_obstacles(rng, outbox);
            }
        }
    }

    /// Puts earned rows into the queue. Rows earned against an incoming queue cancel it
    /// batch by batch first; only the surplus attacks. Returns if the owner changed.
    fn queue_obstacles(&mut self, scorer: Side, earned: u32) -> bool {
        if earned == 0 {
            return false;
        }
        let before = self.obstacle_owner;
        let mut remaining = earned;
        if before == Some(scorer.opponent()) {
            while remaining > 0 {
                let Some(front) = self.obstacle_queue.front_mut() else {
                    break;
                };
                let cancelled = remaining.min(*front);
                *front -= cancelled;
                remaining -= cancelled;
                if *front == 0 {
                    self.obstacle_queue.pop_front();
                }
            }
            if self.obstacle_queue.is_empty() {
                self.obstacle_owner = None;
            }
        }
        if remaining > 0 {
            self.obstacle_queue.push_back(remaining);
            self.obstacle_owner = Some(scorer);
        }
        before != self.obstacle_owner
    }

    /// The receiving side sees the queue, the owner sees an empty list.
    fn announce_obstacles(&self, outbox: &mut Outbox) {
        for side in Side::BOTH {
            let count = if self.obstacle_owner == Some(side.opponent()) {
                self.pending_obstacles()
            } else {
                Vec::new()
            };
            self.send(side, ServerMessage::Obstacle { count }, outbox);
        }
    }

    fn deliver_obstacles<R: Rng>(&mut self, rng: &mut R, outbox: &mut Outbox) {
        let Some(owner) = self.obstacle_owner else {
            return;
        };
        let Some(batch) = self.obstacle_queue.pop_front() else {
            return;
        };
        let target = owner.opponent();
        let lines: Vec<Row> = (0..batch).map(|_| new_line(rng, true)).collect();
        self.players[target.index()].board.push_rows(&lines);
        self.send(target, ServerMessage::Addition { board: lines }, outbox);
        tracing::debug!(match_name = %self.name, ?target, batch, "Obstacles delivered.");

        if self.obstacle_queue.is_empty() {
            self.obstacle_owner = None;
        }
        self.announce_obstacles(outbox);
        if self.judge(outbox) {
            return;
        }
        self.restart_delivery(outbox);
    }

    /// Cancels a running delivery and starts a fresh period if anybody owns obstacles.
    fn restart_delivery(&mut self, outbox: &mut Outbox) {
        if let Some(timer) = self.delivery_timer.take() {
            outbox.cancel_timer(timer);
        }
        if self.obstacle_owner.is_some() {
            self.delivery_timer = Some(outbox.start_timer(
                &self.name,
                TimerKind::Delivery,
                self.timings.delivery_interval,
            ));
        }
    }

    /// Ends the match if a board overflows. Every overflowing side loses, so a double
    /// overflow loses for both.
    fn judge(&mut self, outbox: &mut Outbox) -> bool {
        let overflowing = Side::BOTH.map(|side| self.board(side).overflows());
        if !overflowing.contains(&true) {
            return false;
        }
        for side in Side::BOTH {
            let verdict = if overflowing[side.index()] {
                ServerMessage::Lose
            } else {
                ServerMessage::Win
            };
            self.send(side, verdict, outbox);
        }
        tracing::info!(match_name = %self.name, ?overflowing, "Match decided.");
        self.finish(outbox);
        true
    }

    /// The terminal transition. Cancels every timer the match still holds.
    fn finish(&mut self, outbox: &mut Outbox) {
        self.status = MatchStatus::Finished;
        for timer in [self.opening_timer.take(), self.delivery_timer.take()]
            .into_iter()
            .flatten()
        {
            outbox.cancel_timer(timer);
        }
        self.opening_rows = None;
        self.obstacle_queue.clear();
        self.obstacle_owner = None;
    }

    #[cfg(test)]
    pub fn board_mut(&mut self, side: Side) -> &mut Board {
        &mut self.players[side.index()].board
    }
}
