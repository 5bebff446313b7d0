use tokio::sync::oneshot;
use ulid::Ulid;

use crate::limits::MAX_BOOKINGS_PER_OWNER;
use crate::model::*;
use crate::observability::{BOOKINGS_COMMITTED_TOTAL, CONFLICTS_TOTAL};

use super::conflict::{check_no_conflict, validate_booked_by, validate_span};
use super::{Engine, EngineError, WalCommand};

impl Engine {
    /// Admit a new booking for `owner_id` if it overlaps none of the owner's
    /// existing bookings. The id is assigned here.
    pub async fn create_booking(
        &self,
        owner_id: Ulid,
        booked_by: &str,
        start: Ms,
        end: Ms,
    ) -> Result<Booking, EngineError> {
        let booked_by = validate_booked_by(booked_by)?;
        let span = validate_span(start, end)?;

        let gate = self.commit_gate.clone().read_owned().await;
        let guard = self.store.calendar_or_create(owner_id).write_owned().await;

        if let Err(e) = check_no_conflict(&guard, &span, None) {
            tracing::debug!("create for owner {owner_id} rejected: {e}");
            metrics::counter!(CONFLICTS_TOTAL, "op" => "create").increment(1);
            return Err(e);
        }
        if guard.len() >= MAX_BOOKINGS_PER_OWNER {
            return Err(EngineError::validation("too many bookings for owner"));
        }

        let booking = Booking {
            id: Ulid::new(),
            owner_id,
            booked_by,
            span,
        };
        let event = Event::BookingCreated {
            id: booking.id,
            owner_id,
            booked_by: booking.booked_by.clone(),
            span,
        };
        self.commit(gate, guard, event).await?;

        tracing::debug!("booking {} committed for owner {owner_id}", booking.id);
        metrics::counter!(BOOKINGS_COMMITTED_TOTAL, "op" => "create").increment(1);
        Ok(booking)
    }

    /// Change the span and/or `booked_by` of an existing booking. The new
    /// span is checked against every other booking of the same owner.
    pub async fn update_booking(
        &self,
        id: Ulid,
        patch: BookingPatch,
    ) -> Result<Booking, EngineError> {
        if patch.is_empty() {
            return Err(EngineError::validation("nothing to update"));
        }
        let new_booked_by = patch
            .booked_by
            .as_deref()
            .map(validate_booked_by)
            .transpose()?;

        let gate = self.commit_gate.clone().read_owned().await;
        let guard = self.resolve_booking_write(id).await?;
        let current = guard.get(id).cloned().ok_or(EngineError::NotFound(id))?;

        let span = validate_span(
            patch.start.unwrap_or(current.span.start),
            patch.end.unwrap_or(current.span.end),
        )?;
        if let Err(e) = check_no_conflict(&guard, &span, Some(id)) {
            tracing::debug!("update of {id} rejected: {e}");
            metrics::counter!(CONFLICTS_TOTAL, "op" => "update").increment(1);
            return Err(e);
        }

        let updated = Booking {
            id,
            owner_id: current.owner_id,
            booked_by: new_booked_by.unwrap_or(current.booked_by),
            span,
        };
        let event = Event::BookingUpdated {
            id,
            owner_id: updated.owner_id,
            booked_by: updated.booked_by.clone(),
            span,
        };
        self.commit(gate, guard, event).await?;

        metrics::counter!(BOOKINGS_COMMITTED_TOTAL, "op" => "update").increment(1);
        Ok(updated)
    }

    /// Remove a booking. Removal cannot create an overlap, so there is no check.
    pub async fn delete_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let gate = self.commit_gate.clone().read_owned().await;
        let guard = self.resolve_booking_write(id).await?;
        let removed = guard.get(id).cloned().ok_or(EngineError::NotFound(id))?;

        let event = Event::BookingDeleted {
            id,
            owner_id: removed.owner_id,
        };
        self.commit(gate, guard, event).await?;

        metrics::counter!(BOOKINGS_COMMITTED_TOTAL, "op" => "delete").increment(1);
        Ok(removed)
    }

    /// Compact the WAL by rewriting it with one `BookingCreated` per live booking.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // Exclusive gate: no commit is between its conflict check and its
        // WAL append while the snapshot is taken and swapped in.
        let _gate = self.commit_gate.write().await;

        let mut events = Vec::with_capacity(self.store.booking_count());
        for cal in self.store.calendars() {
            let guard = cal.read().await;
            events.extend(guard.bookings.iter().map(|b| Event::BookingCreated {
                id: b.id,
                owner_id: b.owner_id,
                booked_by: b.booked_by.clone(),
                span: b.span,
            }));
        }
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        tracing::info!("WAL compacted to {count} bookings");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
