use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

pub type SharedCalendar = Arc<RwLock<OwnerCalendar>>;

/// Per-owner booking calendars plus a booking id → owner index.
///
/// Each calendar sits behind its own lock, so owners never contend with
/// each other. Mutations go through [`BookingStore::apply_event`] while the
/// caller holds that owner's write lock.
pub struct BookingStore {
    calendars: DashMap<Ulid, SharedCalendar>,
    booking_to_owner: DashMap<Ulid, Ulid>,
}

impl Default for BookingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingStore {
    pub fn new() -> Self {
        Self {
            calendars: DashMap::new(),
            booking_to_owner: DashMap::new(),
        }
    }

    /// Rebuild state from replayed WAL events. Nothing is shared yet, so
    /// calendars are built unlocked and wrapped at the end.
    pub fn from_events(events: &[Event]) -> Self {
        let store = Self::new();
        let mut calendars: HashMap<Ulid, OwnerCalendar> = HashMap::new();
        for event in events {
            let owner_id = event.owner_id();
            let cal = calendars
                .entry(owner_id)
                .or_insert_with(|| OwnerCalendar::new(owner_id));
            store.apply_event(cal, event);
        }
        for (owner_id, cal) in calendars {
            store.calendars.insert(owner_id, Arc::new(RwLock::new(cal)));
        }
        store
    }

    // ── Calendars ────────────────────────────────────────────

    pub fn owner_count(&self) -> usize {
        self.calendars.len()
    }

    pub fn booking_count(&self) -> usize {
        self.booking_to_owner.len()
    }

    pub fn calendar(&self, owner_id: &Ulid) -> Option<SharedCalendar> {
        self.calendars.get(owner_id).map(|e| e.value().clone())
    }

    /// Get the owner's calendar, creating an empty one on first use.
    /// The entry API guarantees two racing first bookings see the same lock.
    pub fn calendar_or_create(&self, owner_id: Ulid) -> SharedCalendar {
        self.calendars
            .entry(owner_id)
            .or_insert_with(|| Arc::new(RwLock::new(OwnerCalendar::new(owner_id))))
            .value()
            .clone()
    }

    pub fn calendars(&self) -> Vec<SharedCalendar> {
        self.calendars.iter().map(|e| e.value().clone()).collect()
    }

    // ── Booking index ────────────────────────────────────────

    pub fn owner_of(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_owner.get(booking_id).map(|e| *e.value())
    }

    // ── Event application ────────────────────────────────────

    pub fn apply_event(&self, cal: &mut OwnerCalendar, event: &Event) {
        match event {
            Event::BookingCreated {
                id,
                owner_id,
                booked_by,
                span,
            } => {
                cal.insert_booking(Booking {
                    id: *id,
                    owner_id: *owner_id,
                    booked_by: booked_by.clone(),
                    span: *span,
                });
                self.booking_to_owner.insert(*id, *owner_id);
            }
            Event::BookingUpdated {
                id,
                owner_id,
                booked_by,
                span,
            } => {
                // Remove + insert keeps the calendar sorted when start moves.
                cal.remove_booking(*id);
                cal.insert_booking(Booking {
                    id: *id,
                    owner_id: *owner_id,
                    booked_by: booked_by.clone(),
                    span: *span,
                });
                self.booking_to_owner.insert(*id, *owner_id);
            }
            Event::BookingDeleted { id, .. } => {
                cal.remove_booking(*id);
                self.booking_to_owner.remove(id);
            }
        }
    }
}
