//! Background polling loop.
//!
//! Periodically re-fetches inquiry and payment aggregates, feeds the
//! notification tracker, and broadcasts one-shot events when new records
//! appear. All "real-time" behavior is polling; there are no sockets.
//!
//! Concurrency model: single loop task, last-write-wins. A request
//! sequence counter discards late-arriving responses that were overtaken
//! by a newer completed cycle, and an md5 fingerprint of the payload skips
//! redundant snapshot writes when nothing changed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::db::{self, DbState, SESSION_CATEGORY};
use crate::decode::{decode_collection, decode_inquiry, decode_payment};
use crate::join::{self, EntityIndex};
use crate::models::{Inquiry, Payment, Role};
use crate::notify::{self, KIND_INQUIRIES, KIND_PAYMENTS};
use crate::{api, auth, storage};

/// Poll every 5 seconds for admins, 10 for users.
pub fn poll_interval(role: Role) -> Duration {
    match role {
        Role::Admin => Duration::from_secs(5),
        Role::User => Duration::from_secs(10),
    }
}

/// A transient "new records arrived" notification.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationEvent {
    pub kind: String,
    pub count: i64,
    pub delta: i64,
    pub badge: i64,
    pub timestamp: String,
}

/// Shared state for the poll loop.
pub struct PollState {
    pub is_running: Arc<AtomicBool>,
    pub last_poll: Arc<Mutex<Option<String>>>,
    /// Which kind's page the user is currently viewing, if any
    /// (read-on-view badge semantics).
    viewing: Mutex<Option<String>>,
    seq: AtomicU64,
    applied: AtomicU64,
}

impl PollState {
    pub fn new() -> Self {
        Self {
            is_running: Arc::new(AtomicBool::new(false)),
            last_poll: Arc::new(Mutex::new(None)),
            viewing: Mutex::new(None),
            seq: AtomicU64::new(0),
            applied: AtomicU64::new(0),
        }
    }

    /// Record that the user navigated to a kind's page (or away, with
    /// `None`). Marks the kind seen at its last polled count.
    pub fn set_viewing(&self, db: &DbState, kind: Option<&str>) {
        if let Ok(mut v) = self.viewing.lock() {
            *v = kind.map(String::from);
        }
        if let Some(kind) = kind {
            let count = last_polled_count(db, kind);
            let _ = notify::mark_seen(db, kind, count);
        }
    }

    fn is_viewing(&self, kind: &str) -> bool {
        self.viewing
            .lock()
            .map(|v| v.as_deref() == Some(kind))
            .unwrap_or(false)
    }

    /// Take a sequence number for a new fetch cycle.
    fn begin_cycle(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Try to apply a completed cycle; false when a newer cycle already
    /// applied (stale response, must be discarded).
    fn try_apply(&self, seq: u64) -> bool {
        self.applied.fetch_max(seq, Ordering::SeqCst) <= seq
    }
}

impl Default for PollState {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Pending counts
// ---------------------------------------------------------------------------

/// Inquiries awaiting attention: freshly sent or still pending.
fn pending_inquiries(inquiries: &[Inquiry]) -> i64 {
    inquiries
        .iter()
        .filter(|i| i.status == "sent" || i.status == "pending")
        .count() as i64
}

/// Payments awaiting attention: unpaid or waiting for verification.
fn pending_payments(payments: &[Payment]) -> i64 {
    payments
        .iter()
        .filter(|p| p.status == "pending" || p.status == "waiting_verification")
        .count() as i64
}

/// Keep only payments the session identity owns, directly or via the
/// joined inquiry (the same ownership rule the payment listing applies).
fn retain_owned_payments(payments: &mut Vec<Payment>, inquiries: &[Inquiry], identity: &str) {
    let index = EntityIndex::build(Vec::new(), Vec::new(), inquiries.to_vec(), Vec::new());
    payments.retain(|p| join::is_owned_by(identity, join::payment_owner(p, &index).as_deref()));
}

fn last_polled_count(db: &DbState, kind: &str) -> i64 {
    let conn = match db.conn.lock() {
        Ok(c) => c,
        Err(_) => return 0,
    };
    db::get_setting(&conn, SESSION_CATEGORY, &format!("prev_count.{kind}"))
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Snapshot storage
// ---------------------------------------------------------------------------

/// Store the latest decoded snapshot for a kind unless its fingerprint
/// matches the previous write.
fn store_snapshot_if_changed(db: &DbState, kind: &str, payload: &Value) -> Result<bool, String> {
    let text = payload.to_string();
    let fingerprint = format!("{:x}", md5::compute(text.as_bytes()));

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let fp_key = format!("snapshot_fp.{kind}");
    if db::get_setting(&conn, SESSION_CATEGORY, &fp_key).as_deref() == Some(&fingerprint) {
        return Ok(false);
    }
    db::set_setting(&conn, SESSION_CATEGORY, &format!("snapshot.{kind}"), &text)?;
    db::set_setting(&conn, SESSION_CATEGORY, &fp_key, &fingerprint)?;
    Ok(true)
}

/// Read back the latest stored snapshot for a kind.
pub fn latest_snapshot(db: &DbState, kind: &str) -> Option<Value> {
    let conn = db.conn.lock().ok()?;
    db::get_setting(&conn, SESSION_CATEGORY, &format!("snapshot.{kind}"))
        .and_then(|s| serde_json::from_str(&s).ok())
}

// ---------------------------------------------------------------------------
// The loop
// ---------------------------------------------------------------------------

/// Run one poll cycle: fetch, count, track, broadcast.
pub async fn poll_once(
    db: &DbState,
    state: &PollState,
    events: &broadcast::Sender<NotificationEvent>,
) -> Result<(), String> {
    let base = auth::backend_url()?;
    let token = auth::token()?;
    let role = auth::session_role(db);
    let seq = state.begin_cycle();

    let (inquiry_resp, payment_resp) = tokio::try_join!(
        api::fetch_from_backend(&base, &token, "/inquiry", "GET", None),
        api::fetch_from_backend(&base, &token, "/payment", "GET", None),
    )?;

    if !state.try_apply(seq) {
        debug!(seq, "discarding stale poll response");
        return Ok(());
    }

    let mut inquiries = decode_collection(&inquiry_resp, decode_inquiry);
    let mut payments = decode_collection(&payment_resp, decode_payment);

    // Users only count their own records.
    if role != Role::Admin {
        let identity = auth::require_identity(db)?;
        retain_owned_payments(&mut payments, &inquiries, &identity);
        inquiries.retain(|i| i.user_id == identity);
    }

    for (kind, count, payload) in [
        (KIND_INQUIRIES, pending_inquiries(&inquiries), &inquiry_resp),
        (KIND_PAYMENTS, pending_payments(&payments), &payment_resp),
    ] {
        if store_snapshot_if_changed(db, kind, payload)? {
            debug!(kind, "snapshot updated");
        }
        let update = notify::record_poll(db, kind, count, state.is_viewing(kind))?;
        if update.delta > 0 {
            let event = NotificationEvent {
                kind: update.kind.clone(),
                count: update.count,
                delta: update.delta,
                badge: update.badge,
                timestamp: Utc::now().to_rfc3339(),
            };
            info!(kind = %event.kind, delta = event.delta, "new records since last poll");
            let _ = events.send(event);
        }
    }

    if let Ok(mut last) = state.last_poll.lock() {
        *last = Some(Utc::now().to_rfc3339());
    }
    Ok(())
}

/// Start the background poll loop. The interval follows the session role
/// and is re-evaluated every cycle, so an admin login speeds polling up
/// without a restart. Stop by clearing `state.is_running`.
pub fn start_poll_loop(
    db: Arc<DbState>,
    state: Arc<PollState>,
    events: broadcast::Sender<NotificationEvent>,
) {
    let is_running = state.is_running.clone();
    is_running.store(true, Ordering::SeqCst);

    tokio::spawn(async move {
        info!("poll loop started");

        loop {
            if !is_running.load(Ordering::SeqCst) {
                info!("poll loop stopped");
                break;
            }

            let role = auth::session_role(&db);
            tokio::time::sleep(poll_interval(role)).await;

            if !is_running.load(Ordering::SeqCst) {
                break;
            }

            if !storage::is_configured() {
                continue;
            }

            // A stored token without a session snapshot means a restart (or
            // a transient failure during startup resume); re-establish
            // before polling instead of failing the identity gate forever.
            if auth::session_user(&db).is_none() {
                if let Err(e) = auth::resume_session(&db).await {
                    warn!(error = %e, "session resume failed");
                    continue;
                }
            }

            if let Err(e) = poll_once(&db, &state, &events).await {
                if api::is_auth_failure(&e) {
                    auth::handle_auth_failure(&db, "poll_loop", &e);
                } else {
                    warn!(error = %e, "poll cycle failed");
                }
            }
        }
    });
}

/// Signal the loop to stop after its current cycle.
pub fn stop_poll_loop(state: &PollState) {
    state.is_running.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use std::path::PathBuf;

    fn test_db() -> DbState {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        crate::db::run_migrations_for_test(&conn);
        DbState {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        }
    }

    fn inquiry(status: &str) -> Inquiry {
        Inquiry {
            id: "i".into(),
            user_id: "1".into(),
            unit_id: None,
            unit_type_id: None,
            purchase_type: crate::models::PurchaseType::Rent,
            status: status.into(),
            address: None,
            created_at: None,
            id_card_photos: vec![],
        }
    }

    fn payment(status: &str) -> Payment {
        Payment {
            id: "p".into(),
            inquiry_id: None,
            user_id: Some("1".into()),
            amount: None,
            method: None,
            status: status.into(),
            due_date: None,
            paid_at: None,
            proof: vec![],
            invoice_url: None,
            proof_url: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_pending_count_definitions() {
        let inquiries = vec![inquiry("sent"), inquiry("pending"), inquiry("approved")];
        assert_eq!(pending_inquiries(&inquiries), 2);

        let payments = vec![
            payment("pending"),
            payment("waiting_verification"),
            payment("confirmed"),
            payment("rejected"),
        ];
        assert_eq!(pending_payments(&payments), 2);
    }

    #[test]
    fn test_owned_payments_include_inquiry_owned() {
        let mut inq = inquiry("approved");
        inq.id = "i1".into();
        inq.user_id = "100".into();

        let mut via_inquiry = payment("pending");
        via_inquiry.id = "p1".into();
        via_inquiry.user_id = None;
        via_inquiry.inquiry_id = Some("i1".into());
        let mut direct = payment("waiting_verification");
        direct.id = "p2".into();
        direct.user_id = Some("100".into());
        let mut other = payment("pending");
        other.id = "p3".into();
        other.user_id = Some("200".into());

        let mut payments = vec![via_inquiry, direct, other];
        retain_owned_payments(&mut payments, &[inq], "100");
        let ids: Vec<&str> = payments.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
        // The inquiry-owned payment counts toward the pending aggregate.
        assert_eq!(pending_payments(&payments), 2);
    }

    #[test]
    fn test_poll_intervals_by_role() {
        assert_eq!(poll_interval(Role::Admin), Duration::from_secs(5));
        assert_eq!(poll_interval(Role::User), Duration::from_secs(10));
    }

    #[test]
    fn test_stale_cycle_discarded() {
        let state = PollState::new();
        let first = state.begin_cycle();
        let second = state.begin_cycle();
        // The newer cycle completes first.
        assert!(state.try_apply(second));
        assert!(!state.try_apply(first));
    }

    #[test]
    fn test_snapshot_fingerprint_skips_redundant_writes() {
        let db = test_db();
        let payload = serde_json::json!([{ "id": 1, "status": "pending" }]);
        assert!(store_snapshot_if_changed(&db, KIND_PAYMENTS, &payload).unwrap());
        assert!(!store_snapshot_if_changed(&db, KIND_PAYMENTS, &payload).unwrap());

        let changed = serde_json::json!([{ "id": 1, "status": "confirmed" }]);
        assert!(store_snapshot_if_changed(&db, KIND_PAYMENTS, &changed).unwrap());
        assert_eq!(
            latest_snapshot(&db, KIND_PAYMENTS).unwrap()[0]["status"],
            "confirmed"
        );
    }

    #[test]
    fn test_set_viewing_marks_seen_at_last_count() {
        let db = test_db();
        let state = PollState::new();
        notify::record_poll(&db, KIND_INQUIRIES, 4, false).expect("seed");
        notify::record_poll(&db, KIND_INQUIRIES, 6, false).expect("poll");
        assert_eq!(notify::badge_count(&db, KIND_INQUIRIES, 6), 6);

        state.set_viewing(&db, Some(KIND_INQUIRIES));
        assert!(state.is_viewing(KIND_INQUIRIES));
        assert_eq!(notify::badge_count(&db, KIND_INQUIRIES, 6), 0);

        state.set_viewing(&db, None);
        assert!(!state.is_viewing(KIND_INQUIRIES));
    }
}
