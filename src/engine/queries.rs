use ulid::Ulid;

use crate::model::*;

use super::conflict::find_conflict;
use super::Engine;

impl Engine {
    /// All bookings of an owner, ordered by start. Unknown owners have none.
    pub async fn list_bookings(&self, owner_id: Ulid) -> Vec<Booking> {
        let Some(cal) = self.store.calendar(&owner_id) else {
            return Vec::new();
        };
        let guard = cal.read().await;
        guard.bookings.clone()
    }

    pub async fn get_booking(&self, id: Ulid) -> Option<Booking> {
        let owner_id = self.store.owner_of(&id)?;
        let cal = self.store.calendar(&owner_id)?;
        let guard = cal.read().await;
        guard.get(id).cloned()
    }

    /// Would `candidate` collide with any of the owner's bookings other than
    /// `exclude`? Advisory only: the answer can be stale by the time a
    /// create or update runs, which re-checks under the owner's write lock.
    pub async fn has_conflict(&self, owner_id: Ulid, candidate: Span, exclude: Option<Ulid>) -> bool {
        let Some(cal) = self.store.calendar(&owner_id) else {
            return false;
        };
        let guard = cal.read().await;
        find_conflict(&guard, &candidate, exclude).is_some()
    }

    /// Every booking of the owner overlapping `window`, ordered by start.
    pub async fn conflicting_bookings(
        &self,
        owner_id: Ulid,
        window: Span,
        exclude: Option<Ulid>,
    ) -> Vec<Booking> {
        let Some(cal) = self.store.calendar(&owner_id) else {
            return Vec::new();
        };
        let guard = cal.read().await;
        guard
            .overlapping(&window)
            .filter(|b| Some(b.id) != exclude)
            .cloned()
            .collect()
    }
}
