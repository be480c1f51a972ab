//! In-memory exchange slots.
//!
//! Each room holds at most one offer and one answer. Writers are not
//! authenticated and there is no versioning: a replace is applied atomically to
//! its room's slot and the last write wins. Requests that do not name a room
//! share [`DEFAULT_ROOM`], which behaves as the single global slot.
//!
//! Named rooms exist only while they hold something: clearing one drops it.
//! Room names are bounded in length and the number of live rooms is capped.

use chrono::{DateTime, Utc};
use cradle_proto::{Answer, Envelope, ExchangeKind, Offer, StoreStatus, DEFAULT_ROOM};
use dashmap::DashMap;
use thiserror::Error;

/// Longest accepted room name, in bytes.
pub const MAX_ROOM_NAME_BYTES: usize = 128;

/// Live named rooms allowed when no limit is configured.
pub const DEFAULT_MAX_ROOMS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("room name exceeds {MAX_ROOM_NAME_BYTES} bytes")]
    NameTooLong,
    #[error("room limit of {0} reached")]
    Full(usize),
}

/// Rejects room names the store will not key on.
pub fn validate_room(room: &str) -> Result<&str, RoomError> {
    if room.len() > MAX_ROOM_NAME_BYTES {
        return Err(RoomError::NameTooLong);
    }
    Ok(room)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeSlot {
    pub offer: Option<Offer>,
    pub answer: Option<Answer>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl ExchangeSlot {
    pub fn read(&self, kind: ExchangeKind) -> Option<Envelope> {
        match kind {
            ExchangeKind::Offer => self.offer.clone().map(Envelope::Offer),
            ExchangeKind::Answer => self.answer.clone().map(Envelope::Answer),
        }
    }

    fn apply(&mut self, envelope: Envelope, now: DateTime<Utc>) -> StoreStatus {
        let status = match envelope {
            Envelope::Clear => {
                self.offer = None;
                self.answer = None;
                StoreStatus::ExchangeCleared
            }
            Envelope::Offer(offer) => {
                // A new offer invalidates whatever answer was paired with the old one.
                self.offer = Some(offer);
                self.answer = None;
                StoreStatus::OfferStored
            }
            Envelope::Answer(answer) => {
                self.answer = Some(answer);
                StoreStatus::AnswerStored
            }
        };
        self.modified_at = Some(now);
        status
    }
}

#[derive(Debug)]
pub struct ExchangeStore {
    rooms: DashMap<String, ExchangeSlot>,
    max_rooms: usize,
}

impl Default for ExchangeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ExchangeStore {
    pub fn new() -> Self {
        Self::with_room_limit(DEFAULT_MAX_ROOMS)
    }

    /// `max_rooms` counts named rooms; the default room is always available.
    pub fn with_room_limit(max_rooms: usize) -> Self {
        let rooms = DashMap::new();
        rooms.insert(DEFAULT_ROOM.to_string(), ExchangeSlot::default());
        Self { rooms, max_rooms }
    }

    pub fn read(&self, room: &str, kind: ExchangeKind) -> Option<Envelope> {
        self.rooms.get(room).and_then(|slot| slot.read(kind))
    }

    /// Applies `envelope` to the room's slot while holding that entry's lock.
    ///
    /// A clear on a named room removes it. The room cap is checked before the
    /// entry is taken, so concurrent creators may overshoot it slightly.
    pub fn replace(&self, room: &str, envelope: Envelope) -> Result<StoreStatus, RoomError> {
        validate_room(room)?;
        if room == DEFAULT_ROOM {
            let mut slot = self.rooms.entry(room.to_string()).or_default();
            return Ok(slot.apply(envelope, Utc::now()));
        }
        if matches!(envelope, Envelope::Clear) {
            self.rooms.remove(room);
            return Ok(StoreStatus::ExchangeCleared);
        }
        if !self.rooms.contains_key(room) && self.named_rooms() >= self.max_rooms {
            return Err(RoomError::Full(self.max_rooms));
        }
        let mut slot = self.rooms.entry(room.to_string()).or_default();
        Ok(slot.apply(envelope, Utc::now()))
    }

    fn named_rooms(&self) -> usize {
        self.rooms.len().saturating_sub(1)
    }

    pub fn slot(&self, room: &str) -> ExchangeSlot {
        self.rooms
            .get(room)
            .map(|slot| slot.value().clone())
            .unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
