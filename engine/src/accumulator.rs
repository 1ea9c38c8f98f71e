//! Click accumulator - the optimistic counting core.
//!
//! The accumulator splits the locally known count into three buckets:
//! server-confirmed, pending (recorded but not yet sent), and in-flight
//! (sent but not yet confirmed). Deltas move between buckets atomically,
//! which is what keeps the displayed count stable across network latency
//! and write failures.

use crate::{Clicks, Delta};
use serde::{Deserialize, Serialize};

/// Origin flag carried by every live-update notification.
///
/// Remote document stores with latency compensation deliver an echo of a
/// local write before the server has durably confirmed it. The two kinds
/// must be told apart: applying an echo as if it were confirmed state
/// double-counts the write that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotOrigin {
    /// Locally originated write echo, not yet server-acknowledged.
    LocalEcho,
    /// Server-acknowledged state.
    Confirmed,
}

/// Session-scoped optimistic click state.
///
/// Created on sign-in, reset on sign-out, never persisted. All operations
/// are pure and deterministic; the async layer decides *when* to flush,
/// the accumulator decides *what* a flush moves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickAccumulator {
    /// Last server-confirmed count.
    remote: Clicks,
    /// Clicks recorded locally since the last flush began.
    pending: Delta,
    /// Clicks inside flush requests awaiting a confirmed echo.
    in_flight: Delta,
    /// Amount moved by the outstanding flush, if one is outstanding.
    /// Doubles as the single-flight guard.
    active_flush: Option<Delta>,
}

impl ClickAccumulator {
    /// Create an accumulator with no known remote count.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an accumulator seeded with a server-confirmed count.
    pub fn with_remote(remote: Clicks) -> Self {
        Self {
            remote,
            ..Self::default()
        }
    }

    /// Last server-confirmed count.
    pub fn remote(&self) -> Clicks {
        self.remote
    }

    /// Clicks not yet part of any flush.
    pub fn pending(&self) -> Delta {
        self.pending
    }

    /// Clicks awaiting a confirmed echo.
    pub fn in_flight(&self) -> Delta {
        self.in_flight
    }

    /// Whether a flush is currently outstanding.
    pub fn flush_outstanding(&self) -> bool {
        self.active_flush.is_some()
    }

    /// The count to display: confirmed plus everything optimistic.
    pub fn displayed(&self) -> Clicks {
        self.remote
            .saturating_add(self.pending)
            .saturating_add(self.in_flight)
    }

    /// Clicks that have not settled on the server yet.
    pub fn unsynced(&self) -> Delta {
        self.pending.saturating_add(self.in_flight)
    }

    /// Record one local click.
    pub fn record_click(&mut self) {
        self.record_clicks(1);
    }

    /// Record `n` local clicks at once.
    pub fn record_clicks(&mut self, n: Delta) {
        self.pending = self.pending.saturating_add(n);
    }

    /// Begin a flush of up to `requested` pending clicks (default: all).
    ///
    /// Single-flight: returns `None` while a flush is outstanding, or when
    /// the amount clamped to the *current* pending delta is zero. Otherwise
    /// moves the amount pending -> in-flight and returns it; the caller
    /// issues exactly one remote increment of that size.
    pub fn begin_flush(&mut self, requested: Option<Delta>) -> Option<Delta> {
        if self.active_flush.is_some() {
            return None;
        }

        // Clamp to what is pending right now, not what was pending when
        // the flush was scheduled.
        let amount = requested.unwrap_or(self.pending).min(self.pending);
        if amount == 0 {
            return None;
        }

        self.pending -= amount;
        self.in_flight = self.in_flight.saturating_add(amount);
        self.active_flush = Some(amount);
        Some(amount)
    }

    /// Mark the outstanding flush as accepted by the store.
    ///
    /// Only releases the single-flight guard. The in-flight amount stays
    /// put until the confirmed echo arrives via [`observe`](Self::observe);
    /// clearing it here would race the write's local echo against its
    /// settlement.
    pub fn complete_flush(&mut self) {
        self.active_flush = None;
    }

    /// Mark the outstanding flush as failed.
    ///
    /// Returns its amount from in-flight back to pending so the next
    /// debounce cycle or the sign-out flush retries it. Displayed count is
    /// unchanged by the round trip.
    pub fn abort_flush(&mut self) {
        if let Some(amount) = self.active_flush.take() {
            self.in_flight = self.in_flight.saturating_sub(amount);
            self.pending = self.pending.saturating_add(amount);
        }
    }

    /// Apply a live-update notification.
    ///
    /// Local echoes are ignored (returns `false`). Confirmed notifications
    /// carry the full authoritative count, so application is idempotent:
    /// the confirmed value replaces `remote` and zeroes `in_flight`.
    pub fn observe(&mut self, clicks: Clicks, origin: SnapshotOrigin) -> bool {
        match origin {
            SnapshotOrigin::LocalEcho => false,
            SnapshotOrigin::Confirmed => {
                self.remote = clicks;
                self.in_flight = 0;
                true
            }
        }
    }

    /// Reset to the zero state. Used on sign-out and user switch.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_accumulator_is_zero() {
        let acc = ClickAccumulator::new();
        assert_eq!(acc.remote(), 0);
        assert_eq!(acc.pending(), 0);
        assert_eq!(acc.in_flight(), 0);
        assert_eq!(acc.displayed(), 0);
        assert!(!acc.flush_outstanding());
    }

    #[test]
    fn clicks_accumulate_into_pending() {
        let mut acc = ClickAccumulator::with_remote(10);
        acc.record_click();
        acc.record_click();
        acc.record_clicks(3);

        assert_eq!(acc.pending(), 5);
        assert_eq!(acc.displayed(), 15);
        assert_eq!(acc.unsynced(), 5);
    }

    #[test]
    fn begin_flush_moves_pending_to_in_flight() {
        let mut acc = ClickAccumulator::with_remote(10);
        acc.record_clicks(3);

        let amount = acc.begin_flush(None).unwrap();
        assert_eq!(amount, 3);
        assert_eq!(acc.pending(), 0);
        assert_eq!(acc.in_flight(), 3);
        assert!(acc.flush_outstanding());

        // Displayed count does not move at flush boundaries.
        assert_eq!(acc.displayed(), 13);
    }

    #[test]
    fn begin_flush_clamps_to_current_pending() {
        let mut acc = ClickAccumulator::new();
        acc.record_clicks(2);

        // Requested more than pending: clamped.
        assert_eq!(acc.begin_flush(Some(10)), Some(2));
        assert_eq!(acc.pending(), 0);
        assert_eq!(acc.in_flight(), 2);
    }

    #[test]
    fn begin_flush_partial_leaves_residue() {
        let mut acc = ClickAccumulator::new();
        acc.record_clicks(5);

        assert_eq!(acc.begin_flush(Some(3)), Some(3));
        assert_eq!(acc.pending(), 2);
        assert_eq!(acc.in_flight(), 3);
    }

    #[test]
    fn begin_flush_with_nothing_pending_is_none() {
        let mut acc = ClickAccumulator::with_remote(7);
        assert_eq!(acc.begin_flush(None), None);
        assert_eq!(acc.begin_flush(Some(0)), None);
        assert!(!acc.flush_outstanding());
    }

    #[test]
    fn second_flush_while_outstanding_is_dropped() {
        let mut acc = ClickAccumulator::new();
        acc.record_clicks(3);
        acc.begin_flush(None).unwrap();

        // More clicks arrive while the flush is outstanding.
        acc.record_clicks(2);
        assert_eq!(acc.begin_flush(None), None);
        assert_eq!(acc.pending(), 2);
        assert_eq!(acc.in_flight(), 3);
    }

    #[test]
    fn complete_flush_keeps_in_flight_until_confirmed() {
        let mut acc = ClickAccumulator::with_remote(10);
        acc.record_click();
        acc.begin_flush(None).unwrap();
        acc.complete_flush();

        assert!(!acc.flush_outstanding());
        assert_eq!(acc.in_flight(), 1);
        assert_eq!(acc.displayed(), 11);

        // Confirmed echo settles the write.
        assert!(acc.observe(11, SnapshotOrigin::Confirmed));
        assert_eq!(acc.remote(), 11);
        assert_eq!(acc.in_flight(), 0);
        assert_eq!(acc.displayed(), 11);
    }

    #[test]
    fn abort_flush_restores_pending_exactly() {
        let mut acc = ClickAccumulator::with_remote(10);
        acc.record_click();
        acc.begin_flush(None).unwrap();
        assert_eq!((acc.pending(), acc.in_flight()), (0, 1));

        acc.abort_flush();
        assert_eq!((acc.pending(), acc.in_flight()), (1, 0));
        assert!(!acc.flush_outstanding());
        assert_eq!(acc.displayed(), 11);
    }

    #[test]
    fn abort_without_outstanding_flush_is_noop() {
        let mut acc = ClickAccumulator::with_remote(3);
        acc.record_clicks(2);
        acc.abort_flush();
        assert_eq!((acc.pending(), acc.in_flight()), (2, 0));
    }

    #[test]
    fn local_echo_is_ignored() {
        let mut acc = ClickAccumulator::with_remote(10);
        acc.record_click();
        acc.begin_flush(None).unwrap();

        assert!(!acc.observe(11, SnapshotOrigin::LocalEcho));
        assert_eq!(acc.remote(), 10);
        assert_eq!(acc.in_flight(), 1);
        assert_eq!(acc.displayed(), 11);
    }

    #[test]
    fn confirmed_observation_is_idempotent() {
        let mut acc = ClickAccumulator::with_remote(10);
        acc.record_click();
        acc.begin_flush(None).unwrap();
        acc.complete_flush();

        acc.observe(11, SnapshotOrigin::Confirmed);
        let settled = acc.clone();
        acc.observe(11, SnapshotOrigin::Confirmed);
        assert_eq!(acc, settled);
    }

    #[test]
    fn interleaved_writer_confirmation_keeps_authoritative_value() {
        // Another client on the same account pushed 5 clicks; the
        // confirmed value is authoritative, not a delta.
        let mut acc = ClickAccumulator::with_remote(10);
        assert!(acc.observe(15, SnapshotOrigin::Confirmed));
        assert_eq!(acc.remote(), 15);
        assert_eq!(acc.displayed(), 15);
    }

    #[test]
    fn reset_returns_to_zero() {
        let mut acc = ClickAccumulator::with_remote(42);
        acc.record_clicks(3);
        acc.begin_flush(Some(1)).unwrap();

        acc.reset();
        assert_eq!(acc, ClickAccumulator::new());
    }

    #[test]
    fn serialization_roundtrip() {
        let mut acc = ClickAccumulator::with_remote(7);
        acc.record_clicks(2);
        acc.begin_flush(Some(1)).unwrap();

        let json = serde_json::to_string(&acc).unwrap();
        assert!(json.contains("inFlight")); // camelCase
        let parsed: ClickAccumulator = serde_json::from_str(&json).unwrap();
        assert_eq!(acc, parsed);
    }
}
