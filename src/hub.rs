//! Room-scoped fan-out for live connections.
//!
//! Every room id names a group. A connection joins one group with
//! [`Hub::subscribe`] and stays a member until its [`Subscription`] is dropped.
//! [`Hub::publish`] delivers to whoever is a member at that instant; nothing is
//! buffered for members who join later.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::broadcast::{self, error::{RecvError, TryRecvError}};
use uuid::Uuid;

pub const DEFAULT_CAPACITY: usize = 64;

/// One frame pushed to a member: `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub event: String,
    pub data: serde_json::Value,
}

struct Group {
    tx: broadcast::Sender<Event>,
    members: HashSet<Uuid>,
}

#[derive(Clone)]
pub struct Hub {
    groups: Arc<Mutex<HashMap<String, Group>>>,
    capacity: usize,
}

impl Hub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// `capacity` bounds how many events a slow member may fall behind
    /// before it starts missing them. Zero is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            groups: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    fn groups(&self) -> MutexGuard<'_, HashMap<String, Group>> {
        // the map is never left half-updated, so a poisoned lock is still usable
        self.groups.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self, connection_id: Uuid, room_id: &str) -> Subscription {
        let mut groups = self.groups();
        let group = groups
            .entry(room_id.to_owned())
            .or_insert_with(|| Group {
                tx: broadcast::channel(self.capacity).0,
                members: HashSet::new(),
            });
        group.members.insert(connection_id);
        let rx = group.tx.subscribe();

        tracing::debug!(%connection_id, room_id, members = group.members.len(), "joined room");

        Subscription {
            hub: self.clone(),
            connection_id,
            room_id: room_id.to_owned(),
            rx,
        }
    }

    fn leave(&self, connection_id: Uuid, room_id: &str) {
        let mut groups = self.groups();
        let Some(group) = groups.get_mut(room_id) else {
            return;
        };
        group.members.remove(&connection_id);
        if group.members.is_empty() {
            groups.remove(room_id);
        }

        tracing::debug!(%connection_id, room_id, "left room");
    }

    /// Sends `payload` as `event` to the current members of `room_id` and
    /// returns how many were reached. Unknown rooms are a silent no-op.
    pub fn publish<T: Serialize>(&self, room_id: &str, event: &str, payload: &T) -> usize {
        let data = match serde_json::to_value(payload) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(room_id, event, "dropping unserializable payload: {e}");
                return 0;
            }
        };

        let groups = self.groups();
        let Some(group) = groups.get(room_id) else {
            return 0;
        };
        group.tx
            .send(Event { event: event.to_owned(), data })
            .unwrap_or(0)
    }

    pub fn members(&self, room_id: &str) -> usize {
        self.groups()
            .get(room_id)
            .map_or(0, |group| group.members.len())
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

/// Membership of one connection in one room. Dropping it leaves the room.
pub struct Subscription {
    hub: Hub,
    connection_id: Uuid,
    room_id: String,
    rx: broadcast::Receiver<Event>,
}

impl Subscription {
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Next event for this member, or `None` once the group is gone.
    /// Events missed by lagging too far behind are skipped.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(connection_id = %self.connection_id, skipped, "member lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.leave(self.connection_id, &self.room_id);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn publish_reaches_only_the_named_room() {
        let hub = Hub::new();
        let mut r1 = hub.subscribe(Uuid::now_v7(), "r1");
        let mut r2 = hub.subscribe(Uuid::now_v7(), "r2");

        let reached = hub.publish("r1", "message", &json!({"messageId": "m1"}));
        assert_eq!(reached, 1);

        let event = r1.recv().await.unwrap();
        assert_eq!(event, Event { event: "message".to_owned(), data: json!({"messageId": "m1"}) });
        assert!(r2.try_recv().is_none());
    }

    #[tokio::test]
    async fn every_member_of_a_room_receives() {
        let hub = Hub::new();
        let mut a = hub.subscribe(Uuid::now_v7(), "r1");
        let mut b = hub.subscribe(Uuid::now_v7(), "r1");
        assert_eq!(hub.members("r1"), 2);

        assert_eq!(hub.publish("r1", "message", &"hi"), 2);
        assert_eq!(a.recv().await.unwrap().data, json!("hi"));
        assert_eq!(b.recv().await.unwrap().data, json!("hi"));
    }

    #[test]
    fn publish_without_members_is_noop() {
        let hub = Hub::new();
        assert_eq!(hub.publish("nobody", "message", &json!({})), 0);
    }

    #[test]
    fn dropping_subscription_leaves_the_room() {
        let hub = Hub::new();
        let a = hub.subscribe(Uuid::now_v7(), "r1");
        let b = hub.subscribe(Uuid::now_v7(), "r1");
        assert_eq!(a.room_id(), "r1");

        drop(a);
        assert_eq!(hub.members("r1"), 1);
        drop(b);
        assert_eq!(hub.members("r1"), 0);
        assert!(hub.groups().is_empty());
        assert_eq!(hub.publish("r1", "message", &json!({})), 0);
    }

    #[test]
    fn late_joiners_get_no_history() {
        let hub = Hub::new();
        let _early = hub.subscribe(Uuid::now_v7(), "r1");
        hub.publish("r1", "message", &json!({"messageId": "old"}));

        let mut late = hub.subscribe(Uuid::now_v7(), "r1");
        assert!(late.try_recv().is_none());
    }

    #[test]
    fn zero_capacity_still_delivers() {
        let hub = Hub::with_capacity(0);
        let mut member = hub.subscribe(Uuid::now_v7(), "r1");

        assert_eq!(hub.publish("r1", "message", &json!({"messageId": "m1"})), 1);
        assert_eq!(member.try_recv().unwrap().data, json!({"messageId": "m1"}));
    }

    #[test]
    fn lagging_member_skips_to_newest() {
        let hub = Hub::with_capacity(2);
        let mut slow = hub.subscribe(Uuid::now_v7(), "r1");
        for i in 0..5 {
            hub.publish("r1", "message", &i);
        }

        assert_eq!(slow.try_recv().unwrap().data, json!(3));
        assert_eq!(slow.try_recv().unwrap().data, json!(4));
        assert!(slow.try_recv().is_none());
    }
}
