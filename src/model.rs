use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, UTC — the only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Checked constructor for untrusted input.
    pub fn try_new(start: Ms, end: Ms) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Back-to-back spans (`a.end == b.start`) do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A committed booking against an owner's calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub owner_id: Ulid,
    pub booked_by: String,
    pub span: Span,
}

/// Fields an update may change. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingPatch {
    pub start: Option<Ms>,
    pub end: Option<Ms>,
    pub booked_by: Option<String>,
}

impl BookingPatch {
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none() && self.booked_by.is_none()
    }
}

/// One owner's bookings, sorted by `span.start`.
#[derive(Debug, Clone)]
pub struct OwnerCalendar {
    pub owner_id: Ulid,
    pub bookings: Vec<Booking>,
}

impl OwnerCalendar {
    pub fn new(owner_id: Ulid) -> Self {
        Self {
            owner_id,
            bookings: Vec::new(),
        }
    }

    /// Insert booking maintaining sort order by span.start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    /// Remove booking by id.
    pub fn remove_booking(&mut self, id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn get(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    /// Return only bookings whose span overlaps the query window.
    /// Uses binary search to skip bookings starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self
            .bookings
            .partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BookingCreated {
        id: Ulid,
        owner_id: Ulid,
        booked_by: String,
        span: Span,
    },
    BookingUpdated {
        id: Ulid,
        owner_id: Ulid,
        booked_by: String,
        span: Span,
    },
    BookingDeleted {
        id: Ulid,
        owner_id: Ulid,
    },
}

impl Event {
    pub fn owner_id(&self) -> Ulid {
        match self {
            Event::BookingCreated { owner_id, .. }
            | Event::BookingUpdated { owner_id, .. }
            | Event::BookingDeleted { owner_id, .. } => *owner_id,
        }
    }
}
