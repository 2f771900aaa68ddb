use crate::engine::ids::EntityId;
use crate::job::{Job, JobId};
use crate::policy::allocation::{AllocationCore, CancelResult};
use crate::policy::ar::reply::{ArCreateResult, ArQueryResult, ArSimpleResult, TimeSlot};
use crate::policy::ar::timeline::{ArTimeline, ReservationId, ReservationStatus};
use crate::resource::ResourceCharacteristics;

/// Advance-reservation-capable resource policy: a plain [`AllocationCore`] for
/// immediate, unreserved job placement, plus an [`ArTimeline`] tracking committed and
/// pending reservations over the future.
///
/// Every non-AR verb (submit/cancel/pause/resume/status/move) is simply delegated to
/// `core`, unchanged; AR only adds the reservation admission layer that carves out PEs
/// ahead of time so a later commit is guaranteed capacity.
pub struct ArPolicy {
    pub core: AllocationCore,
    pub timeline: ArTimeline,
    /// Whether this resource accepts "immediate, duration = 0" opportunistic
    /// reservations that pre-empt running jobs. Refused by default; see
    /// `DESIGN.md` for the reasoning behind this default.
    pub allow_opportunistic_reservations: bool,
}

impl ArPolicy {
    pub fn new(characteristics: ResourceCharacteristics) -> Self {
        ArPolicy { core: AllocationCore::new(characteristics), timeline: ArTimeline::new(), allow_opportunistic_reservations: false }
    }

    fn total_pe(&self) -> u32 {
        self.core.characteristics.total_pe_count()
    }

    /// `AR_CREATE`: admits a future reservation over `[start_time_ms, start_time_ms +
    /// duration_ms)`. The reservation stays `Pending` until `commit` is called;
    /// `expiry_time_ms` is the deadline by which that commit must happen, after which
    /// [`Self::expire_overdue`] reclaims the capacity. On success also returns the
    /// `expiry_time_ms` so the caller can carry it back in the `AR_CREATE` reply (S3
    /// expects `AR_CREATE_OK(rid, expiry)`).
    pub fn create_reservation(
        &mut self,
        user_id: EntityId,
        start_time_ms: i64,
        duration_ms: i64,
        requested_pe: u32,
        expiry_time_ms: i64,
    ) -> (ArCreateResult, Option<ReservationId>, Option<i64>) {
        if requested_pe > self.total_pe() {
            return (ArCreateResult::FailResourceCantSupport, None, None);
        }
        match self.timeline.admission_test(self.total_pe(), start_time_ms, duration_ms, requested_pe) {
            Ok(()) => {
                let id = self.timeline.insert(user_id, start_time_ms, duration_ms, requested_pe, expiry_time_ms, false);
                (ArCreateResult::Ok, Some(id), Some(expiry_time_ms))
            }
            Err(remainder_ms) if remainder_ms == i64::MAX => (ArCreateResult::FailResourceCantSupport, None, None),
            Err(remainder_ms) => (ArCreateResult::full_in(remainder_ms), None, None),
        }
    }

    /// `AR_CREATE` with `duration = 0`: an immediate, opportunistic reservation meant to
    /// run right away rather than at a scheduled future start. Only honored when the
    /// resource has opted in via [`Self::allow_opportunistic_reservations`]; otherwise
    /// treated identically to a capacity failure so the caller falls back to a plain
    /// `submit`.
    pub fn create_immediate_reservation(&mut self, user_id: EntityId, now_ms: i64, requested_pe: u32) -> (ArCreateResult, Option<ReservationId>, Option<i64>) {
        if !self.allow_opportunistic_reservations {
            return (ArCreateResult::FailResourceCantSupport, None, None);
        }
        if requested_pe > self.total_pe() {
            return (ArCreateResult::FailResourceCantSupport, None, None);
        }
        let id = self.timeline.insert(user_id, now_ms, 0, requested_pe, now_ms, true);
        if let Some(r) = self.timeline.get_mut(id) {
            r.set_status(ReservationStatus::Committed);
        }
        (ArCreateResult::Ok, Some(id), Some(now_ms))
    }

    /// `AR_MODIFY`: re-tests admission for a new `(start, duration, requested_pe)`
    /// triple as if the existing reservation were removed first, then applies it in
    /// place on success. Only legal while the reservation is still `Pending`.
    pub fn modify_reservation(&mut self, reservation_id: ReservationId, start_time_ms: i64, duration_ms: i64, requested_pe: u32) -> ArSimpleResult {
        let Some(existing) = self.timeline.get(reservation_id) else {
            return ArSimpleResult::NotFound;
        };
        if existing.status != ReservationStatus::Pending {
            return ArSimpleResult::ModifyError;
        }
        let removed = self.timeline.remove(reservation_id).expect("checked above");
        match self.timeline.admission_test(self.total_pe(), start_time_ms, duration_ms, requested_pe) {
            Ok(()) => {
                let new_id = self.timeline.insert(removed.user_id, start_time_ms, duration_ms, requested_pe, removed.expiry_time_ms, removed.opportunistic);
                let _ = new_id;
                ArSimpleResult::Ok
            }
            Err(remainder_ms) if remainder_ms == i64::MAX => {
                self.timeline.insert(removed.user_id, removed.start_time_ms, removed.duration_ms, removed.requested_pe, removed.expiry_time_ms, removed.opportunistic);
                ArSimpleResult::ErrorResourceCantSupport
            }
            Err(_) => {
                self.timeline.insert(removed.user_id, removed.start_time_ms, removed.duration_ms, removed.requested_pe, removed.expiry_time_ms, removed.opportunistic);
                ArSimpleResult::ModifyError
            }
        }
    }

    /// `AR_CANCEL`, covering all three overloads from §4.6: `job_ids = None` cancels
    /// the whole reservation (every attached job plus the reservation itself);
    /// `Some(ids)` cancels only the named jobs (one id or a list), leaving the
    /// reservation in the timeline unless that empties its job set. Returns the
    /// cancelled jobs so the caller can hand each back to its owner.
    pub fn cancel_reservation(&mut self, reservation_id: ReservationId, job_ids: Option<&[JobId]>, now: f64) -> (ArSimpleResult, Vec<Job>) {
        let Some(reservation) = self.timeline.get(reservation_id) else {
            return (ArSimpleResult::NotFound, Vec::new());
        };
        let targets: Vec<JobId> = match job_ids {
            Some(ids) => reservation.jobs.iter().copied().filter(|id| ids.contains(id)).collect(),
            None => reservation.jobs.clone(),
        };

        let mut cancelled = Vec::with_capacity(targets.len());
        for &job_id in &targets {
            if let (CancelResult::Ok, Some(job)) = self.core.cancel(job_id, now) {
                cancelled.push(job);
            }
        }

        let whole_reservation = job_ids.is_none();
        if let Some(reservation) = self.timeline.get_mut(reservation_id) {
            reservation.jobs.retain(|id| !targets.contains(id));
            if whole_reservation || reservation.jobs.is_empty() {
                self.timeline.remove(reservation_id);
            }
        }
        (ArSimpleResult::Ok, cancelled)
    }

    /// Re-tests admission for a still-`Pending` reservation immediately before it
    /// commits. Creation only guarantees capacity against other *committed*
    /// reservations (§3's AR timeline only tracks committed PE usage), so two
    /// overlapping `Pending` reservations can both be created; only one of them may
    /// actually commit without breaking the capacity invariant (§8, property 4).
    fn can_still_commit(&self, reservation_id: ReservationId) -> bool {
        let Some(r) = self.timeline.get(reservation_id) else { return false };
        self.timeline.admission_test(self.total_pe(), r.start_time_ms, r.duration_ms, r.requested_pe).is_ok()
    }

    /// `AR_COMMIT` with no job attached: simply confirms the reservation's capacity
    /// without admitting any work yet (the user intends to submit jobs against it
    /// later, individually addressed to the reservation). A commit arriving after
    /// `expiry_time_ms` is rejected and expires the reservation on the spot, rather
    /// than relying solely on [`Self::expire_overdue`] having already swept it.
    pub fn commit_only(&mut self, reservation_id: ReservationId, now_ms: i64) -> ArSimpleResult {
        let Some(reservation) = self.timeline.get(reservation_id) else {
            return ArSimpleResult::NotFound;
        };
        if reservation.status == ReservationStatus::Committed {
            return ArSimpleResult::AlreadyCommitted;
        }
        if reservation.status != ReservationStatus::Pending {
            return ArSimpleResult::Error;
        }
        if now_ms > reservation.expiry_time_ms {
            self.timeline.get_mut(reservation_id).expect("checked above").set_status(ReservationStatus::Expired);
            return ArSimpleResult::Error;
        }
        if !self.can_still_commit(reservation_id) {
            return ArSimpleResult::ErrorResourceCantSupport;
        }
        self.timeline.get_mut(reservation_id).expect("checked above").set_status(ReservationStatus::Committed);
        ArSimpleResult::Ok
    }

    /// `AR_COMMIT` with a job attached: commits the reservation and immediately admits
    /// a job of `length_mi`/`requested_pe` onto it, bypassing the ordinary wait queue
    /// since the PEs were already carved out at `create_reservation` time.
    pub fn commit_reservation(&mut self, reservation_id: ReservationId, owner_id: EntityId, length_mi: i64, requested_pe: u32, now: f64) -> (ArSimpleResult, Option<JobId>) {
        let now_ms = (now * 1000.0) as i64;
        let Some(reservation) = self.timeline.get(reservation_id) else {
            return (ArSimpleResult::NotFound, None);
        };
        if reservation.status == ReservationStatus::Committed {
            return (ArSimpleResult::AlreadyCommitted, None);
        }
        if reservation.status != ReservationStatus::Pending {
            return (ArSimpleResult::Error, None);
        }
        let expiry_time_ms = reservation.expiry_time_ms;
        let reserved_pe = reservation.requested_pe;
        if now_ms > expiry_time_ms {
            self.timeline.get_mut(reservation_id).expect("checked above").set_status(ReservationStatus::Expired);
            return (ArSimpleResult::Error, None);
        }
        if requested_pe > reserved_pe {
            return (ArSimpleResult::ErrorResourceCantSupport, None);
        }
        if !self.can_still_commit(reservation_id) {
            return (ArSimpleResult::ErrorResourceCantSupport, None);
        }
        let reservation = self.timeline.get_mut(reservation_id).expect("checked above");
        reservation.set_status(ReservationStatus::Committed);

        let job_id = self.core.admit_reserved(owner_id, length_mi, requested_pe, now);
        if let Some(rj) = self.core.job_mut(job_id) {
            rj.reservation_id = Some(reservation_id);
        }
        if let Some(reservation) = self.timeline.get_mut(reservation_id) {
            reservation.jobs.push(job_id);
        }
        (ArSimpleResult::Ok, Some(job_id))
    }

    /// `AR_QUERY_STATUS`: returns the reservation's stored lifecycle state, except a
    /// `Committed` reservation is reported as `Active` or `Completed` once `now_ms`
    /// enters or passes its `[start_time_ms, start_time_ms + duration_ms)` window,
    /// per §4.6's status set. This is a read-time projection, not a stored transition:
    /// the timeline keeps tracking capacity against `Committed` either way (see
    /// `ArTimeline::committed_pe_at`).
    pub fn query_status(&self, reservation_id: ReservationId, now_ms: i64) -> ArQueryResult {
        match self.timeline.get(reservation_id) {
            Some(r) => {
                let status = match r.status {
                    ReservationStatus::Committed if now_ms >= r.start_time_ms + r.duration_ms => ReservationStatus::Completed,
                    ReservationStatus::Committed if now_ms >= r.start_time_ms => ReservationStatus::Active,
                    other => other,
                };
                ArQueryResult::Status(status)
            }
            None => ArQueryResult::NotFound,
        }
    }

    /// `AR_QUERY_BUSY_TIME`: every committed/active reservation interval overlapping
    /// `[from_time_ms, to_time_ms)`, clipped to that window.
    pub fn query_busy_time(&self, from_time_ms: i64, to_time_ms: i64) -> Vec<TimeSlot> {
        self.timeline
            .iter()
            .filter(|r| matches!(r.status, ReservationStatus::Committed | ReservationStatus::Active))
            .filter_map(|r| clip_interval(r.start_time_ms, r.duration_ms, from_time_ms, to_time_ms).map(|(s, d)| TimeSlot { start_time_ms: s, duration_ms: d, pe_count: r.requested_pe }))
            .collect()
    }

    /// `AR_QUERY_FREE_TIME`: the complement of [`Self::query_busy_time`] within the
    /// same window. Per §4.6, free and busy are strict duals — `freeSlot.pe = totalPE -
    /// busySlot.pe` over the same sub-interval — so this partitions `[from_time_ms,
    /// to_time_ms)` at every reservation boundary and reports the remaining capacity
    /// for each sub-interval, not just the fully-idle gaps between busy intervals.
    pub fn query_free_time(&self, from_time_ms: i64, to_time_ms: i64) -> Vec<TimeSlot> {
        let total = self.total_pe();
        let mut boundaries: Vec<i64> = vec![from_time_ms, to_time_ms];
        for r in self.timeline.iter().filter(|r| matches!(r.status, ReservationStatus::Committed | ReservationStatus::Active)) {
            let start = r.start_time_ms;
            let end = r.start_time_ms + r.duration_ms;
            if start > from_time_ms && start < to_time_ms {
                boundaries.push(start);
            }
            if end > from_time_ms && end < to_time_ms {
                boundaries.push(end);
            }
        }
        boundaries.sort_unstable();
        boundaries.dedup();

        let mut free = Vec::new();
        for pair in boundaries.windows(2) {
            let (seg_start, seg_end) = (pair[0], pair[1]);
            if seg_end <= seg_start {
                continue;
            }
            let committed = self.timeline.committed_pe_at(seg_start);
            let free_pe = total.saturating_sub(committed);
            if free_pe > 0 {
                free.push(TimeSlot { start_time_ms: seg_start, duration_ms: seg_end - seg_start, pe_count: free_pe });
            }
        }
        free
    }

    /// Sweeps `Pending` reservations whose `expiry_time_ms` has passed without a
    /// commit, transitioning them to `Expired` and freeing their reserved capacity.
    /// A commit landing exactly at `expiry_time_ms` still counts as on time, so this
    /// only reclaims reservations strictly past their deadline.
    /// Returns the ids reclaimed, for logging/statistics.
    pub fn expire_overdue(&mut self, now_ms: i64) -> Vec<ReservationId> {
        let overdue: Vec<ReservationId> = self
            .timeline
            .iter()
            .filter(|r| r.status == ReservationStatus::Pending && now_ms > r.expiry_time_ms)
            .map(|r| r.reservation_id)
            .collect();
        for id in &overdue {
            if let Some(r) = self.timeline.get_mut(*id) {
                r.set_status(ReservationStatus::Expired);
            }
        }
        overdue
    }
}

fn clip_interval(start: i64, duration: i64, from: i64, to: i64) -> Option<(i64, i64)> {
    let end = start + duration;
    let clipped_start = start.max(from);
    let clipped_end = end.min(to);
    if clipped_end > clipped_start {
        Some((clipped_start, clipped_end - clipped_start))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{AllocationModel, Machine, MachineId};

    fn user() -> EntityId {
        let mut map: slotmap::SlotMap<EntityId, ()> = slotmap::SlotMap::with_key();
        map.insert(())
    }

    fn make_policy(pe_count: u32) -> ArPolicy {
        let characteristics = ResourceCharacteristics {
            machines: vec![Machine::new(MachineId(0), pe_count, 1000, 0)],
            allocation_model: AllocationModel::AdvanceReservation,
            cost_per_sec: 0.2,
            resource_time_zone: 0,
        };
        ArPolicy::new(characteristics)
    }

    #[test]
    fn non_overlapping_reservations_are_both_admitted() {
        let mut policy = make_policy(4);
        let (r1, id1, _) = policy.create_reservation(user(), 1_000, 5_000, 4, 500);
        assert_eq!(r1, ArCreateResult::Ok);
        assert!(id1.is_some());

        let (r2, id2, _) = policy.create_reservation(user(), 10_000, 5_000, 4, 500);
        assert_eq!(r2, ArCreateResult::Ok);
        assert!(id2.is_some());
    }

    #[test]
    fn overlapping_overcommitted_reservation_is_rejected_with_full_in_bucket() {
        let mut policy = make_policy(4);
        let (_, id1, _) = policy.create_reservation(user(), 1_000, 10_000, 4, 500);
        policy.commit_only(id1.unwrap(), 0);

        let (result, id2, _) = policy.create_reservation(user(), 5_000, 1_000, 2, 500);
        assert!(id2.is_none());
        match result {
            ArCreateResult::FailResourceFullIn { bucket_seconds } => assert!(bucket_seconds > 0),
            other => panic!("expected FailResourceFullIn, got {other:?}"),
        }
    }

    #[test]
    fn commit_without_job_then_cancel_releases_nothing_owed() {
        let mut policy = make_policy(2);
        let (_, id, _) = policy.create_reservation(user(), 0, 1_000, 2, 500);
        let id = id.unwrap();
        assert_eq!(policy.commit_only(id, 0), ArSimpleResult::Ok);
        assert_eq!(policy.commit_only(id, 0), ArSimpleResult::AlreadyCommitted);
        let (result, cancelled) = policy.cancel_reservation(id, None, 0.0);
        assert_eq!(result, ArSimpleResult::Ok);
        assert!(cancelled.is_empty());
        assert_eq!(policy.query_status(id, 0), ArQueryResult::NotFound);
    }

    #[test]
    fn commit_revalidates_capacity_against_other_pending_reservations() {
        // Two overlapping, fully-overcommitting reservations can both be created
        // (creation only checks against already-committed usage), but only one may
        // actually commit.
        let mut policy = make_policy(4);
        let (r1, id1, _) = policy.create_reservation(user(), 1_000, 10_000, 4, 500);
        let (r2, id2, _) = policy.create_reservation(user(), 1_000, 10_000, 4, 500);
        assert_eq!(r1, ArCreateResult::Ok);
        assert_eq!(r2, ArCreateResult::Ok);
        let id1 = id1.unwrap();
        let id2 = id2.unwrap();

        assert_eq!(policy.commit_only(id1, 0), ArSimpleResult::Ok);
        assert_eq!(policy.commit_only(id2, 0), ArSimpleResult::ErrorResourceCantSupport);
        assert_eq!(policy.query_status(id2, 0), ArQueryResult::Status(ReservationStatus::Pending));
    }

    #[test]
    fn expire_overdue_reclaims_pending_reservations() {
        let mut policy = make_policy(2);
        let (_, id, _) = policy.create_reservation(user(), 5_000, 1_000, 2, 1_000);
        let id = id.unwrap();

        let expired = policy.expire_overdue(500);
        assert!(expired.is_empty());

        let expired = policy.expire_overdue(1_500);
        assert_eq!(expired, vec![id]);
        assert_eq!(policy.query_status(id, 1_500), ArQueryResult::Status(ReservationStatus::Expired));
    }

    #[test]
    fn commit_strictly_after_expiry_is_rejected_but_commit_exactly_at_expiry_still_succeeds() {
        let mut policy = make_policy(2);
        let (_, id, _) = policy.create_reservation(user(), 5_000, 1_000, 2, 5_000);
        let id = id.unwrap();

        // A commit landing exactly at the deadline is still on time.
        policy.expire_overdue(5_000);
        assert_eq!(policy.query_status(id, 5_000), ArQueryResult::Status(ReservationStatus::Pending));
        assert_eq!(policy.commit_only(id, 5_000), ArSimpleResult::Ok);

        let (_, id2, _) = policy.create_reservation(user(), 10_000, 1_000, 2, 10_000);
        let id2 = id2.unwrap();
        // A commit strictly after the deadline is rejected by commit_only itself, even
        // if the periodic expire_overdue sweep has not yet run.
        assert_eq!(policy.commit_only(id2, 10_001), ArSimpleResult::Error);
        assert_eq!(policy.query_status(id2, 10_001), ArQueryResult::Status(ReservationStatus::Expired));
    }

    #[test]
    fn query_status_reports_active_then_completed_as_the_window_elapses() {
        let mut policy = make_policy(2);
        let (_, id, _) = policy.create_reservation(user(), 5_000, 1_000, 2, 5_000);
        let id = id.unwrap();
        assert_eq!(policy.commit_only(id, 0), ArSimpleResult::Ok);

        assert_eq!(policy.query_status(id, 0), ArQueryResult::Status(ReservationStatus::Committed));
        assert_eq!(policy.query_status(id, 5_000), ArQueryResult::Status(ReservationStatus::Active));
        assert_eq!(policy.query_status(id, 5_500), ArQueryResult::Status(ReservationStatus::Active));
        assert_eq!(policy.query_status(id, 6_000), ArQueryResult::Status(ReservationStatus::Completed));
    }

    #[test]
    fn busy_and_free_time_partition_the_query_window() {
        let mut policy = make_policy(4);
        let (_, id, _) = policy.create_reservation(user(), 2_000, 1_000, 3, 500);
        policy.commit_only(id.unwrap(), 0);

        let busy = policy.query_busy_time(0, 5_000);
        assert_eq!(busy.len(), 1);
        assert_eq!(busy[0], TimeSlot { start_time_ms: 2_000, duration_ms: 1_000, pe_count: 3 });

        // 3 of 4 PEs are busy over [2_000, 3_000), so that sub-interval still has 1 PE
        // free rather than being omitted: free.pe + busy.pe = totalPE throughout.
        let free = policy.query_free_time(0, 5_000);
        assert_eq!(
            free,
            vec![
                TimeSlot { start_time_ms: 0, duration_ms: 2_000, pe_count: 4 },
                TimeSlot { start_time_ms: 2_000, duration_ms: 1_000, pe_count: 1 },
                TimeSlot { start_time_ms: 3_000, duration_ms: 2_000, pe_count: 4 },
            ]
        );
    }
}
