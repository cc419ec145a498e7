//! The registry of all matches of the process.
//! It provides:
//! - Name uniqueness and status gated create / join / delete
//! - The anonymous matchmaking slot
//! - Removal of finished matches in the same event that finished them

use crate::game_match::{Match, MatchStatus, MatchTimings, Move, MoveRejected, Side};
use crate::outbox::{Outbox, SessionId, TimerId, TimerKind};
use protocol::ServerMessage;
use rand::Rng;
use rand::rngs::StdRng;
use std::collections::HashMap;

/// What the host of an anonymous room sees instead of the generated name.
pub const RANDOM_ROOM_DISPLAY_NAME: &str = "Waiting...";

/// All matches keyed by name. Owned by the event loop, never shared.
pub struct Registry {
    /// The matches that are waiting or playing.
    matches: HashMap<String, Match>,
    /// The anonymous room waiting for a partner, if any.
    random_room: Option<String>,
    /// Delays handed to every new match.
    timings: MatchTimings,
    /// Source for rows and hidden room names.
    rng: StdRng,
}

impl Registry {
    pub fn new(timings: MatchTimings, rng: StdRng) -> Self {
        Registry {
            matches: HashMap::new(),
            random_room: None,
            timings,
            rng,
        }
    }

    #[cfg(test)]
    pub fn status(&self, name: &str) -> Option<MatchStatus> {
        self.matches.get(name).map(Match::status)
    }

    /// Checks if the session sits in the named match while it is being played.
    pub fn is_playing_in(&self, name: &str, session: SessionId) -> bool {
        self.matches.get(name).is_some_and(|game| {
            game.status() == MatchStatus::Playing
                && Side::BOTH.iter().any(|side| game.holds(*side, session))
        })
    }

    /// Opens a waiting match. The host gets a `CREATE` confirmation carrying the name
    /// or the display name, or a `MESSAGE` if the name is taken.
    pub fn create_match(
        &mut self,
        name: &str,
        host: SessionId,
        display_name: Option<&str>,
        outbox: &mut Outbox,
    ) -> bool {
        if self.matches.contains_key(name) {
            outbox.send(
                host,
                ServerMessage::Message {
                    message: format!("Creation of match {name} failed, the name is taken."),
                },
            );
            return false;
        }
        self.matches
            .insert(name.to_owned(), Match::new(name, host, self.timings));
        outbox.send(
            host,
            ServerMessage::Create {
                name: display_name.unwrap_or(name).to_owned(),
            },
        );
        tracing::info!(match_name = name, host, "Match created.");
        true
    }

    /// Deletes a match that is still waiting. Only its host may do so.
    pub fn delete_match(&mut self, name: &str, host: SessionId, outbox: &mut Outbox) -> bool {
        let Some(game) = self.matches.get_mut(name) else {
            return false;
        };
        if !game.holds(Side::Host, host) || !game.close(outbox) {
            return false;
        }
        self.settle(name);
        true
    }

    /// Seats the guest in a waiting match and starts it.
    pub fn join_match(&mut self, name: &str, guest: SessionId, outbox: &mut Outbox) -> bool {
        let Some(game) = self.matches.get_mut(name) else {
            outbox.send(
                guest,
                ServerMessage::Message {
                    message: format!("Match {name} does not exist."),
                },
            );
            return false;
        };
        if game.holds(Side::Host, guest) || !game.join(guest, &mut self.rng, outbox) {
            outbox.send(
                guest,
                ServerMessage::Message {
                    message: format!("Match {name} cannot be joined."),
                },
            );
            return false;
        }
        if self.random_room.as_deref() == Some(name) {
            self.random_room = None;
        }
        tracing::info!(match_name = name, guest, "Match started.");
        true
    }

    /// Pairs the session with the pending anonymous room, or opens one under a hidden
    /// name. Returns the match name and the side the session got.
    pub fn join_random(&mut self, session: SessionId, outbox: &mut Outbox) -> Option<(String, Side)> {
        if let Some(name) = self.random_room.clone() {
            let game = self.matches.get(&name);
            // Sessions drop their hosted room before asking, other callers keep it.
            if game.is_some_and(|game| game.holds(Side::Host, session)) {
                return Some((name, Side::Host));
            }
            if game.is_some_and(|game| game.status() == MatchStatus::Waiting)
                && self.join_match(&name, session, outbox)
            {
                return Some((name, Side::Guest));
            }
            self.random_room = None;
        }

        let name = self.hidden_name();
        if !self.create_match(&name, session, Some(RANDOM_ROOM_DISPLAY_NAME), outbox) {
            return None;
        }
        self.random_room = Some(name.clone());
        Some((name, Side::Host))
    }

    /// Drops the anonymous slot if it points at the named room and nobody else hosts it.
    pub fn forget_random_room(&mut self, name: &str, session: SessionId) {
        if self.random_room.as_deref() != Some(name) {
            return;
        }
        let foreign = self
            .matches
            .get(name)
            .is_some_and(|game| !game.holds(Side::Host, session));
        if !foreign {
            self.random_room = None;
        }
    }

    /// Applies a move of the session on its side of the named match.
    pub fn remove_block(
        &mut self,
        name: &str,
        side: Side,
        session: SessionId,
        request: Move,
        outbox: &mut Outbox,
    ) -> Result<u32, MoveRejected> {
        let game = self
            .matches
            .get_mut(name)
            .ok_or(MoveRejected::UnknownMatch)?;
        if !game.holds(side, session) {
            return Err(MoveRejected::NotParticipant);
        }
        let result = game.remove_block(side, request, &mut self.rng, outbox);
        self.settle(name);
        result
    }

    /// Gives up the named match on behalf of the session.
    pub fn surrender(&mut self, name: &str, side: Side, session: SessionId, outbox: &mut Outbox) -> bool {
        let Some(game) = self.matches.get_mut(name) else {
            return false;
        };
        if !game.holds(side, session) || !game.surrender(side, outbox) {
            return false;
        }
        self.settle(name);
        true
    }

    /// Routes a timer tick to its match. Ticks for vanished matches are dropped.
    pub fn fire_timer(&mut self, name: &str, kind: TimerKind, timer: TimerId, outbox: &mut Outbox) {
        let Some(game) = self.matches.get_mut(name) else {
            tracing::debug!(match_name = name, timer, "Timer for a removed match.");
            return;
        };
        game.fire_timer(kind, timer, &mut self.rng, outbox);
        self.settle(name);
    }

    /// Generates a list with the current matches, their status and pending obstacles.
    pub fn describe(&self) -> String {
        let mut names: Vec<&String> = self.matches.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| {
                let game = &self.matches[name];
                format!(
                    "Match: {:<34} Status: {:<8} Obstacles: {:?}",
                    name,
                    format!("{:?}", game.status()),
                    game.pending_obstacles()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Removes the named match if it reached its terminal state.
    fn settle(&mut self, name: &str) {
        if !self.matches.get(name).is_some_and(Match::is_finished) {
            return;
        }
        self.matches.remove(name);
        if self.random_room.as_deref() == Some(name) {
            self.random_room = None;
        }
        tracing::info!(match_name = name, "Match removed.");
    }

    /// A fresh name nobody can guess or has taken.
    fn hidden_name(&mut self) -> String {
        loop {
            let name = format!("{:032x}", self.rng.random::<u128>());
            if !self.matches.contains_key(&name) {
                return name;
            }
        }
    }

    #[cfg(test)]
    pub fn game(&self, name: &str) -> Option<&Match> {
        self.matches.get(name)
    }

    #[cfg(test)]
    pub fn game_mut(&mut self, name: &str) -> Option<&mut Match> {
        self.matches.get_mut(name)
    }
}
