//! Notification count tracking.
//!
//! A best-effort, client-only approximation of "unread count" per entity
//! kind, fed by the poll loop. Two independent figures per kind:
//!
//! - **delta**: how many records appeared since the previous poll; a
//!   positive delta triggers a one-shot transient notification.
//! - **badge**: how many records the user has not seen yet, with
//!   read-on-view semantics (viewing a kind's page marks everything seen).
//!
//! Both counters live in the session-scoped settings category, so they
//! reset per session. Neither is authoritative; the backend count is.

use serde::Serialize;

use crate::db::{self, DbState, SESSION_CATEGORY};

/// Tracked entity kinds.
pub const KIND_INQUIRIES: &str = "inquiries";
pub const KIND_PAYMENTS: &str = "payments";

/// Outcome of folding one poll result into the tracker.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PollUpdate {
    pub kind: String,
    pub count: i64,
    /// New records since the previous poll, never negative.
    pub delta: i64,
    /// Unseen records, never negative.
    pub badge: i64,
}

fn prev_key(kind: &str) -> String {
    format!("prev_count.{kind}")
}

fn seen_key(kind: &str) -> String {
    format!("seen_count.{kind}")
}

fn read_count(conn: &rusqlite::Connection, key: &str) -> Option<i64> {
    db::get_setting(conn, SESSION_CATEGORY, key).and_then(|v| v.trim().parse().ok())
}

// ---------------------------------------------------------------------------
// Tracking
// ---------------------------------------------------------------------------

/// Fold a freshly polled count into the per-kind state.
///
/// `viewing` is whether the user currently has that kind's page open; if
/// so the new count is marked seen immediately (read-on-view). The first
/// poll of a session seeds the baseline without emitting a delta, so a
/// fresh session does not fire a notification for a backlog that was
/// already there.
pub fn record_poll(
    db: &DbState,
    kind: &str,
    new_count: i64,
    viewing: bool,
) -> Result<PollUpdate, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let prev = read_count(&conn, &prev_key(kind));
    let delta = match prev {
        Some(p) => (new_count - p).max(0),
        None => 0,
    };
    db::set_setting(&conn, SESSION_CATEGORY, &prev_key(kind), &new_count.to_string())?;

    let seen = if viewing {
        db::set_setting(&conn, SESSION_CATEGORY, &seen_key(kind), &new_count.to_string())?;
        new_count
    } else {
        read_count(&conn, &seen_key(kind)).unwrap_or(0)
    };
    let badge = (new_count - seen).max(0);

    Ok(PollUpdate {
        kind: kind.to_string(),
        count: new_count,
        delta,
        badge,
    })
}

/// Mark a kind as seen at `count` (the user opened that page between
/// polls).
pub fn mark_seen(db: &DbState, kind: &str, count: i64) -> Result<(), String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    db::set_setting(&conn, SESSION_CATEGORY, &seen_key(kind), &count.to_string())
}

/// Current badge figure without recording a poll.
pub fn badge_count(db: &DbState, kind: &str, current_count: i64) -> i64 {
    let conn = match db.conn.lock() {
        Ok(c) => c,
        Err(_) => return 0,
    };
    let seen = read_count(&conn, &seen_key(kind)).unwrap_or(0);
    (current_count - seen).max(0)
}
