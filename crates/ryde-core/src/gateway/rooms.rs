// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Room registry and outbound fan-out.
//!
//! Every connection owns one unbounded outbound queue drained by a single
//! writer task; emitting to a room serializes the event once and enqueues
//! the frame per member. Per-session ordering therefore follows emission
//! order, which the completion protocol relies on. Sends to closed sessions
//! are dropped and counted; no emitter ever blocks.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use ryde_protocol::ServerEvent;

/// Process-unique session identifier.
pub type SessionId = u64;

/// A driver's private room.
pub fn driver_room(driver_id: &str) -> String {
    format!("driver_{}", driver_id)
}

/// A passenger's private room: the string form of the internal user id.
pub fn user_room(user_internal_id: &str) -> String {
    user_internal_id.to_string()
}

/// Registry of live sessions and their room memberships.
#[derive(Default)]
pub struct RoomRegistry {
    sessions: DashMap<SessionId, mpsc::UnboundedSender<String>>,
    rooms: DashMap<String, HashSet<SessionId>>,
    next_id: AtomicU64,
    dropped: AtomicU64,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbound queue, returning its session id.
    pub fn register(&self, tx: mpsc::UnboundedSender<String>) -> SessionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.sessions.insert(id, tx);
        id
    }

    /// Drop a session and remove it from every room.
    pub fn unregister(&self, session: SessionId) {
        self.sessions.remove(&session);
        for mut members in self.rooms.iter_mut() {
            members.value_mut().remove(&session);
        }
        self.rooms.retain(|_, members| !members.is_empty());
    }

    pub fn join(&self, room: &str, session: SessionId) {
        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(session);
    }

    pub fn leave(&self, room: &str, session: SessionId) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.value_mut().remove(&session);
        }
    }

    /// Number of sessions currently joined to a room.
    pub fn room_size(&self, room: &str) -> usize {
        self.rooms.get(room).map(|m| m.len()).unwrap_or(0)
    }

    /// Send an event to one session.
    pub fn send_to_session(&self, session: SessionId, event: &ServerEvent) {
        self.send_frame_to_session(session, event.to_frame());
    }

    /// The raw outbound queue for a session (ack delivery).
    pub fn session_sender(
        &self,
        session: SessionId,
    ) -> Option<mpsc::UnboundedSender<String>> {
        self.sessions.get(&session).map(|tx| tx.clone())
    }

    fn send_frame_to_session(&self, session: SessionId, frame: String) {
        match self.sessions.get(&session) {
            Some(tx) if tx.send(frame).is_ok() => {}
            _ => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Fan an event out to every member of a room.
    pub fn emit_to_room(&self, room: &str, event: &ServerEvent) {
        self.emit_to_room_except(room, None, event);
    }

    /// Fan an event out to a room, excluding one session (e.g. the winning
    /// driver on `rideAlreadyAccepted`).
    pub fn emit_to_room_except(
        &self,
        room: &str,
        except: Option<SessionId>,
        event: &ServerEvent,
    ) {
        let members: Vec<SessionId> = match self.rooms.get(room) {
            Some(members) => members
                .iter()
                .copied()
                .filter(|id| Some(*id) != except)
                .collect(),
            None => return,
        };
        let frame = event.to_frame();
        for member in members {
            self.send_frame_to_session(member, frame.clone());
        }
    }

    /// Broadcast an event to every connected session.
    pub fn broadcast_all(&self, event: &ServerEvent) {
        let frame = event.to_frame();
        let members: Vec<SessionId> = self.sessions.iter().map(|e| *e.key()).collect();
        for member in members {
            self.send_frame_to_session(member, frame.clone());
        }
    }

    /// Frames dropped because the target session's queue was gone.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ryde_protocol::events::RideAlreadyAccepted;

    fn test_event() -> ServerEvent {
        ServerEvent::RideAlreadyAccepted(RideAlreadyAccepted {
            ride_id: "RID000001".to_string(),
        })
    }

    #[tokio::test]
    async fn room_fanout_reaches_only_members() {
        let rooms = RoomRegistry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = rooms.register(tx_a);
        let _b = rooms.register(tx_b);
        rooms.join("drivers_bike", a);

        rooms.emit_to_room("drivers_bike", &test_event());
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn except_skips_the_winner() {
        let rooms = RoomRegistry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = rooms.register(tx_a);
        let b = rooms.register(tx_b);
        rooms.join("drivers_bike", a);
        rooms.join("drivers_bike", b);

        rooms.emit_to_room_except("drivers_bike", Some(a), &test_event());
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn unregister_leaves_all_rooms() {
        let rooms = RoomRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = rooms.register(tx);
        rooms.join("drivers_taxi", session);
        assert_eq!(rooms.room_size("drivers_taxi"), 1);

        rooms.unregister(session);
        assert_eq!(rooms.room_size("drivers_taxi"), 0);
    }

    #[tokio::test]
    async fn send_to_closed_session_is_counted_not_fatal() {
        let rooms = RoomRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let session = rooms.register(tx);
        drop(rx);

        rooms.send_to_session(session, &test_event());
        assert_eq!(rooms.dropped_count(), 1);
    }
}
