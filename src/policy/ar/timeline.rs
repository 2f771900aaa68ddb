use serde::{Deserialize, Serialize};

use crate::engine::ids::EntityId;
use crate::job::JobId;

slotmap::new_key_type! {
    /// Resource-local handle for an advance reservation.
    pub struct ReservationId;
}

/// Lifecycle state of a reservation.
///
/// Only the transitions `Pending -> {Committed, Expired, Cancelled}` and
/// `Committed -> {Completed, Cancelled}` are legal; anything else is a programmer
/// error in the policy implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Active,
    Committed,
    Completed,
    Expired,
    Cancelled,
    Failed,
}

impl ReservationStatus {
    pub fn can_transition_to(self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, next),
            (Pending, Committed) | (Pending, Expired) | (Pending, Cancelled) | (Committed, Completed) | (Committed, Cancelled) | (Committed, Active) | (Active, Completed) | (Active, Cancelled)
        )
    }
}

/// A single committed (or pending) advance reservation on a resource's timeline.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub reservation_id: ReservationId,
    pub user_id: EntityId,
    pub start_time_ms: i64,
    pub duration_ms: i64,
    pub requested_pe: u32,
    pub status: ReservationStatus,
    pub expiry_time_ms: i64,
    /// Jobs admitted against this reservation (populated on commit).
    pub jobs: Vec<JobId>,
    /// Opportunistic "immediate, duration = 0" reservation: pre-emptable, never expires
    /// on its own. Refused unless the owning resource explicitly opts in (see
    /// `GridResource::with_opportunistic_reservations`).
    pub opportunistic: bool,
}

impl Reservation {
    pub fn set_status(&mut self, next: ReservationStatus) {
        if !self.status.can_transition_to(next) {
            log::error!("illegal reservation state transition {:?} -> {:?} for {:?}", self.status, next, self.reservation_id);
            return;
        }
        self.status = next;
    }
}

/// Per-resource ordered collection of committed/pending reservations, keyed by the
/// half-open interval `[start_time_ms, start_time_ms + duration_ms)` they occupy.
///
/// Invariant: at any instant `t`, the sum of `requested_pe` over reservations whose
/// interval contains `t` never exceeds the resource's total PE count. This is enforced
/// by [`Self::admission_test`] before every insertion.
#[derive(Debug, Default)]
pub struct ArTimeline {
    reservations: slotmap::SlotMap<ReservationId, Reservation>,
}

/// The fixed bucket set used to report "busy until" when an AR create request cannot
/// be admitted, as seconds.
const BUCKETS_SECONDS: [i64; 18] = [1, 5, 10, 15, 30, 45, 60, 300, 600, 900, 1_800, 2_700, 3_600, 5 * 3_600, 10 * 3_600, 15 * 3_600, 30 * 3_600, 45 * 3_600];

impl ArTimeline {
    pub fn new() -> Self {
        ArTimeline::default()
    }

    pub fn get(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.get(id)
    }

    pub fn get_mut(&mut self, id: ReservationId) -> Option<&mut Reservation> {
        self.reservations.get_mut(id)
    }

    pub fn remove(&mut self, id: ReservationId) -> Option<Reservation> {
        self.reservations.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations.values()
    }

    /// Committed PE usage at instant `t`, excluding reservations in `Pending`/terminal
    /// states (which do not yet, or no longer, occupy capacity).
    pub fn committed_pe_at(&self, t_ms: i64) -> u32 {
        self.reservations
            .values()
            .filter(|r| matches!(r.status, ReservationStatus::Committed | ReservationStatus::Active))
            .filter(|r| t_ms >= r.start_time_ms && t_ms < r.start_time_ms + r.duration_ms)
            .map(|r| r.requested_pe)
            .sum()
    }

    /// Checks whether `requested_pe` additional PEs can be reserved over
    /// `[start_ms, start_ms + duration_ms)` without violating the capacity invariant.
    ///
    /// On failure, also returns the earliest instant at or after `start_ms` at which
    /// the request *would* fit, used to compute the `RESOURCE_FULL_IN_*` bucket.
    pub fn admission_test(&self, total_pe: u32, start_ms: i64, duration_ms: i64, requested_pe: u32) -> Result<(), i64> {
        if requested_pe > total_pe {
            return Err(i64::MAX);
        }
        // Sample every interval boundary inside the window: occupancy only changes at
        // reservation edges, so checking those instants suffices.
        let mut boundaries: Vec<i64> = vec![start_ms];
        for r in self.reservations.values() {
            if matches!(r.status, ReservationStatus::Committed | ReservationStatus::Active) {
                if r.start_time_ms > start_ms && r.start_time_ms < start_ms + duration_ms {
                    boundaries.push(r.start_time_ms);
                }
                let end = r.start_time_ms + r.duration_ms;
                if end > start_ms && end < start_ms + duration_ms {
                    boundaries.push(end);
                }
            }
        }
        boundaries.sort_unstable();
        boundaries.dedup();

        let mut ok = true;
        for &t in &boundaries {
            if self.committed_pe_at(t) + requested_pe > total_pe {
                ok = false;
                break;
            }
        }
        if ok {
            return Ok(());
        }

        // Find the next instant at/after start_ms with enough free capacity.
        let mut candidates: Vec<i64> = self
            .reservations
            .values()
            .filter(|r| matches!(r.status, ReservationStatus::Committed | ReservationStatus::Active))
            .map(|r| r.start_time_ms + r.duration_ms)
            .filter(|&end| end > start_ms)
            .collect();
        candidates.sort_unstable();
        for end in candidates {
            if self.committed_pe_at(end) + requested_pe <= total_pe {
                return Err(end - start_ms);
            }
        }
        Err(i64::MAX)
    }

    pub fn insert(&mut self, user_id: EntityId, start_time_ms: i64, duration_ms: i64, requested_pe: u32, expiry_time_ms: i64, opportunistic: bool) -> ReservationId {
        self.reservations.insert_with_key(|reservation_id| Reservation {
            reservation_id,
            user_id,
            start_time_ms,
            duration_ms,
            requested_pe,
            status: ReservationStatus::Pending,
            expiry_time_ms,
            jobs: Vec::new(),
            opportunistic,
        })
    }
}

/// Rounds `remainder_ms` (the wait until enough capacity frees up) up to the nearest
/// bucket in `{1,5,10,15,30,45} x {second,minute,hour}`, per the bucketing rule: pick
/// the smallest bucket `>=` the actual remainder; if none fits within an hour, use the
/// largest hour bucket.
pub fn round_to_bucket_seconds(remainder_ms: i64) -> i64 {
    let remainder_s = (remainder_ms + 999) / 1000;
    for &bucket in BUCKETS_SECONDS.iter() {
        if bucket >= remainder_s {
            return bucket;
        }
    }
    *BUCKETS_SECONDS.last().unwrap()
}
