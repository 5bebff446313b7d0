use ulid::Ulid;

use crate::model::*;

use super::EngineError;

pub(crate) fn validate_span(start: Ms, end: Ms) -> Result<Span, EngineError> {
    use crate::limits::*;
    let span = Span::try_new(start, end)
        .ok_or_else(|| EngineError::validation("end must be after start"))?;
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::validation("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::validation("span too wide"));
    }
    Ok(span)
}

/// Trims and checks the `booked_by` label, returning the stored form.
pub(crate) fn validate_booked_by(booked_by: &str) -> Result<String, EngineError> {
    let trimmed = booked_by.trim();
    if trimmed.is_empty() {
        return Err(EngineError::validation("booked_by is required"));
    }
    if trimmed.len() > crate::limits::MAX_BOOKED_BY_LEN {
        return Err(EngineError::validation("booked_by too long"));
    }
    Ok(trimmed.to_string())
}

/// First booking in `cal` that intersects `candidate`, ignoring `exclude`.
///
/// Create and update both go through here, so boundary handling is identical:
/// a booking ending exactly at `candidate.start` (or starting exactly at
/// `candidate.end`) is not a conflict.
pub(crate) fn find_conflict<'a>(
    cal: &'a OwnerCalendar,
    candidate: &Span,
    exclude: Option<Ulid>,
) -> Option<&'a Booking> {
    cal.overlapping(candidate)
        .find(|b| Some(b.id) != exclude && b.span.overlaps(candidate))
}

pub(crate) fn check_no_conflict(
    cal: &OwnerCalendar,
    candidate: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    match find_conflict(cal, candidate, exclude) {
        Some(existing) => Err(EngineError::Conflict(existing.id)),
        None => Ok(()),
    }
}
