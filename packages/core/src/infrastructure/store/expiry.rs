//! Server side expiry of confetti events.
//!
//! Publishers delete their own events after a few seconds, but a publisher
//! that goes away before doing so would leave the event behind forever. The
//! sweeper removes every event older than the TTL, using `createdAt` when the
//! event has one and the time the sweeper first saw it otherwise.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde_json::Value;

use super::memory::InMemoryRealtimeStore;
use crate::domain::{RoomPaths, StorePath};

pub struct ConfettiExpirySweeper {
    store: InMemoryRealtimeStore,
    ttl: Duration,
    first_seen: HashMap<StorePath, i64>,
}

impl ConfettiExpirySweeper {
    pub fn new(store: InMemoryRealtimeStore, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            first_seen: HashMap::new(),
        }
    }

    /// Remove every expired event in one atomic update. Returns how many
    /// events were removed.
    pub async fn sweep_once(&mut self) -> usize {
        let now = self.store.now_millis();
        let ttl = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);

        let rooms = RoomPaths::rooms();
        let Some(Value::Object(room_map)) = self.store.get(&rooms).await else {
            self.first_seen.clear();
            return 0;
        };

        let mut present = Vec::new();
        let mut expired = BTreeMap::new();
        for (room_id, room) in &room_map {
            let Some(Value::Object(events)) = room.get("confetti") else {
                continue;
            };
            for (event_id, event) in events {
                let path = rooms.child(room_id).child("confetti").child(event_id);
                let created_at = match event.get("createdAt").and_then(Value::as_i64) {
                    Some(created_at) => created_at,
                    None => *self.first_seen.entry(path.clone()).or_insert(now),
                };
                if now.saturating_sub(created_at) >= ttl {
                    expired.insert(path, None);
                } else {
                    present.push(path);
                }
            }
        }

        self.first_seen.retain(|path, _| present.contains(path));

        let count = expired.len();
        if count == 0 {
            return 0;
        }
        match self.store.apply(expired).await {
            Ok(()) => {
                tracing::debug!("Expired {} confetti event(s)", count);
                count
            }
            Err(e) => {
                tracing::warn!("Failed to expire confetti events: {}", e);
                0
            }
        }
    }

    /// Sweep every `interval` until the task is cancelled
    pub async fn run(mut self, interval: Duration) {
        tracing::info!(
            "Confetti expiry started (ttl: {:?}, interval: {:?})",
            self.ttl,
            interval
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.sweep_once().await;
        }
    }
}
