//! The per connection state: which match the connection is bound to and in which role.
//! Translates client messages into registry calls.

use crate::game_match::{Move, Side};
use crate::outbox::{Outbox, SessionId};
use crate::registry::Registry;
use protocol::ClientMessage;

/// The binding of one connection.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    /// The match this session created or joined last.
    match_name: Option<String>,
    is_host: bool,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Session {
            id,
            match_name: None,
            is_host: false,
        }
    }

    #[cfg(test)]
    pub fn match_name(&self) -> Option<&str> {
        self.match_name.as_deref()
    }

    #[cfg(test)]
    pub fn is_host(&self) -> bool {
        self.is_host
    }

    fn side(&self) -> Side {
        if self.is_host { Side::Host } else { Side::Guest }
    }

    /// A session already seated in a match.
    #[cfg(test)]
    pub fn bound(id: SessionId, name: &str, side: Side) -> Self {
        let mut session = Session::new(id);
        session.bind(name.to_owned(), side);
        session
    }

    fn bind(&mut self, name: String, side: Side) {
        self.match_name = Some(name);
        self.is_host = side == Side::Host;
    }

    /// A session sitting in a running match has to surrender before it goes elsewhere.
    fn is_busy(&self, registry: &Registry) -> bool {
        self.match_name
            .as_deref()
            .is_some_and(|name| registry.is_playing_in(name, self.id))
    }

    /// Deletes the room this session hosts, as long as nobody joined it.
    fn leave_hosted_room(&mut self, registry: &mut Registry, outbox: &mut Outbox) {
        if !self.is_host {
            return;
        }
        if let Some(name) = self.match_name.as_deref() {
            if registry.delete_match(name, self.id, outbox) {
                self.match_name = None;
            }
        }
    }

    /// Processes one inbound message.
    pub fn handle(&mut self, message: ClientMessage, registry: &mut Registry, outbox: &mut Outbox) {
        match message {
            ClientMessage::Create { name } => {
                if name.is_empty() || self.is_busy(registry) {
                    return;
                }
                self.leave_hosted_room(registry, outbox);
                if registry.create_match(&name, self.id, None, outbox) {
                    self.bind(name, Side::Host);
                }
            }
            ClientMessage::Delete => {
                if let Some(name) = self.match_name.as_deref() {
                    if self.is_host && registry.delete_match(name, self.id, outbox) {
                        self.match_name = None;
                    }
                }
            }
            ClientMessage::Join { name } => {
                if self.is_busy(registry) {
                    return;
                }
                self.leave_hosted_room(registry, outbox);
                if name.is_empty() {
                    if let Some((name, side)) = registry.join_random(self.id, outbox) {
                        self.bind(name, side);
                    }
                } else if registry.join_match(&name, self.id, outbox) {
                    self.bind(name, Side::Guest);
                }
            }
            ClientMessage::Surrender => {
                if let Some(name) = self.match_name.as_deref() {
                    if registry.surrender(name, self.side(), self.id, outbox) {
                        self.match_name = None;
                    }
                }
            }
            ClientMessage::Remove { x, y, empty_count } => {
                let Some(name) = self.match_name.as_deref() else {
                    return;
                };
                let request = Move {
                    x,
                    y,
                    claimed_empty_count: empty_count,
                };
                match registry.remove_block(name, self.side(), self.id, request, outbox) {
                    Ok(score) => tracing::trace!(session = self.id, score, "Move applied."),
                    Err(reason) => tracing::debug!(session = self.id, %reason, "Move rejected."),
                }
            }
        }
    }

    /// Cleans up after the connection went away. Both the delete and the surrender are
    /// attempted, each one is a no-op when the match is in the other state.
    pub fn close(&mut self, registry: &mut Registry, outbox: &mut Outbox) {
        let Some(name) = self.match_name.take() else {
            return;
        };
        registry.forget_random_room(&name, self.id);
        if self.is_host {
            registry.delete_match(&name, self.id, outbox);
        }
        registry.surrender(&name, self.side(), self.id, outbox);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_match::{MatchStatus, MatchTimings};
    use protocol::ServerMessage;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn setup() -> (Registry, Outbox, Session, Session) {
        (
            Registry::new(MatchTimings::default(), StdRng::seed_from_u64(8)),
            Outbox::new(),
            Session::new(1),
            Session::new(2),
        )
    }

    fn create(name: &str) -> ClientMessage {
        ClientMessage::Create { name: name.into() }
    }

    fn join(name: &str) -> ClientMessage {
        ClientMessage::Join { name: name.into() }
    }

    #[test]
    fn create_binds_as_host_and_replaces_the_waiting_room() {
        let (mut registry, mut outbox, mut host, _) = setup();
        host.handle(create(""), &mut registry, &mut outbox);
        assert_eq!(host.match_name(), None);

        host.handle(create("R1"), &mut registry, &mut outbox);
        assert_eq!(host.match_name(), Some("R1"));
        assert!(host.is_host());

        host.handle(create("R2"), &mut registry, &mut outbox);
        assert_eq!(registry.status("R1"), None);
        assert_eq!(registry.status("R2"), Some(MatchStatus::Waiting));
        assert_eq!(host.match_name(), Some("R2"));
    }

    #[test]
    fn failed_create_keeps_no_binding() {
        let (mut registry, mut outbox, mut host, mut other) = setup();
        host.handle(create("R1"), &mut registry, &mut outbox);
        other.handle(create("R1"), &mut registry, &mut outbox);
        assert_eq!(other.match_name(), None);
        let envelopes = outbox.take_envelopes();
        assert!(matches!(envelopes.last().map(|e| &e.message), Some(ServerMessage::Message { .. })));
    }

    #[test]
    fn guests_cannot_delete() {
        let (mut registry, mut outbox, mut host, mut guest) = setup();
        host.handle(create("R1"), &mut registry, &mut outbox);
        guest.handle(join("R1"), &mut registry, &mut outbox);
        guest.handle(ClientMessage::Delete, &mut registry, &mut outbox);
        host.handle(ClientMessage::Delete, &mut registry, &mut outbox);
        assert_eq!(registry.status("R1"), Some(MatchStatus::Playing));
        assert_eq!(guest.match_name(), Some("R1"));
        assert!(!guest.is_host());
    }

    #[test]
    fn delete_clears_the_binding() {
        let (mut registry, mut outbox, mut host, _) = setup();
        host.handle(create("R1"), &mut registry, &mut outbox);
        host.handle(ClientMessage::Delete, &mut registry, &mut outbox);
        assert_eq!(host.match_name(), None);
        assert_eq!(registry.status("R1"), None);
    }

    #[test]
    fn joining_elsewhere_drops_the_own_waiting_room() {
        let (mut registry, mut outbox, mut host, mut guest) = setup();
        host.handle(create("R1"), &mut registry, &mut outbox);
        guest.handle(create("R2"), &mut registry, &mut outbox);
        guest.handle(join("R1"), &mut registry, &mut outbox);
        assert_eq!(registry.status("R2"), None);
        assert_eq!(registry.status("R1"), Some(MatchStatus::Playing));
        assert_eq!(guest.match_name(), Some("R1"));
    }

    #[test]
    fn a_running_match_blocks_create_and_join() {
        let (mut registry, mut outbox, mut host, mut guest) = setup();
        host.handle(create("R1"), &mut registry, &mut outbox);
        guest.handle(join("R1"), &mut registry, &mut outbox);
        host.handle(create("R2"), &mut registry, &mut outbox);
        guest.handle(join(""), &mut registry, &mut outbox);
        assert_eq!(registry.status("R2"), None);
        assert_eq!(host.match_name(), Some("R1"));
        assert_eq!(guest.match_name(), Some("R1"));
    }

    #[test]
    fn anonymous_join_pairs_two_sessions() {
        let (mut registry, mut outbox, mut first, mut second) = setup();
        first.handle(join(""), &mut registry, &mut outbox);
        assert!(first.is_host());
        second.handle(join(""), &mut registry, &mut outbox);
        assert!(!second.is_host());
        assert_eq!(first.match_name(), second.match_name());
        let name = first.match_name().unwrap();
        assert_eq!(registry.status(name), Some(MatchStatus::Playing));
    }

    #[test]
    fn surrender_ends_the_match_and_unbinds() {
        let (mut registry, mut outbox, mut host, mut guest) = setup();
        host.handle(create("R1"), &mut registry, &mut outbox);
        guest.handle(join("R1"), &mut registry, &mut outbox);
        let _ = outbox.take();
        guest.handle(ClientMessage::Surrender, &mut registry, &mut outbox);
        assert_eq!(guest.match_name(), None);
        assert_eq!(registry.status("R1"), None);
        let envelopes = outbox.take_envelopes();
        assert!(envelopes.iter().any(|e| e.to == 1 && e.message == ServerMessage::Win));
        assert!(envelopes.iter().any(|e| e.to == 2 && e.message == ServerMessage::Lose));
    }

    #[test]
    fn closing_a_waiting_host_deletes_the_room() {
        let (mut registry, mut outbox, mut host, mut other) = setup();
        host.handle(join(""), &mut registry, &mut outbox);
        let name = host.match_name().unwrap().to_owned();
        host.close(&mut registry, &mut outbox);
        assert_eq!(registry.status(&name), None);

        other.handle(join(""), &mut registry, &mut outbox);
        assert!(other.is_host());
        assert_ne!(other.match_name(), Some(name.as_str()));
    }

    #[test]
    fn closing_mid_game_surrenders() {
        let (mut registry, mut outbox, mut host, mut guest) = setup();
        host.handle(create("R1"), &mut registry, &mut outbox);
        guest.handle(join("R1"), &mut registry, &mut outbox);
        let _ = outbox.take();
        host.close(&mut registry, &mut outbox);
        assert_eq!(registry.status("R1"), None);
        let envelopes = outbox.take_envelopes();
        assert!(envelopes.iter().any(|e| e.to == 2 && e.message == ServerMessage::Win));
    }

    #[test]
    fn stale_binding_does_not_touch_a_reused_name() {
        let (mut registry, mut outbox, mut host, mut guest) = setup();
        host.handle(create("R1"), &mut registry, &mut outbox);
        guest.handle(join("R1"), &mut registry, &mut outbox);
        host.handle(ClientMessage::Surrender, &mut registry, &mut outbox);

        let mut newcomer = Session::new(3);
        newcomer.handle(create("R1"), &mut registry, &mut outbox);
        guest.close(&mut registry, &mut outbox);
        assert_eq!(registry.status("R1"), Some(MatchStatus::Waiting));
    }

    #[test]
    fn moves_without_a_match_are_ignored() {
        let (mut registry, mut outbox, mut host, _) = setup();
        host.handle(
            ClientMessage::Remove {
                x: 0,
                y: 8,
                empty_count: 8,
            },
            &mut registry,
            &mut outbox,
        );
        let (envelopes, timers) = outbox.take();
        assert!(envelopes.is_empty() && timers.is_empty());
    }
}
