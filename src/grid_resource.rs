use std::collections::HashMap;

use crate::engine::entity::{Entity, EntityContext};
use crate::engine::event::{Event, Payload, Tag};
use crate::engine::ids::{EntityId, EntityName};
use crate::job::{Job, JobId};
use crate::policy::allocation::{AllocationCore, MoveResult};
use crate::policy::ar::{ArPolicy, ArSimpleResult};
use crate::resource::{AllocationModel, MachineId, PeStatus, ResourceCharacteristics};

/// Margin added past a reservation's `expiry_time_ms` before arming its
/// `ReservationExpiryCheck` self-event, so the sweep lands strictly after the
/// deadline instead of exactly on it (where `now_ms == expiry_time_ms` still
/// counts as on time per §5).
const EXPIRY_CHECK_EPSILON_S: f64 = 0.001;

/// Either flavor of allocation policy a resource can run, selected once at
/// construction time from [`ResourceCharacteristics::allocation_model`].
enum Policy {
    Basic(AllocationCore),
    Reservation(ArPolicy),
}

impl Policy {
    fn core(&self) -> &AllocationCore {
        match self {
            Policy::Basic(c) => c,
            Policy::Reservation(p) => &p.core,
        }
    }

    fn core_mut(&mut self) -> &mut AllocationCore {
        match self {
            Policy::Basic(c) => c,
            Policy::Reservation(p) => &mut p.core,
        }
    }
}

/// A single compute resource: a machine/PE pool driven by a basic or advance-reservation
/// allocation policy, a background-load calendar, and a `NodeId -> MachineId` mapping
/// used to translate failure-trace events onto specific machines.
pub struct GridResource {
    name: EntityName,
    policy: Policy,
    calendar: crate::resource::ResourceCalendar,
    node_to_machine: HashMap<String, MachineId>,
    gis_id: Option<EntityId>,
    stats_sink_id: Option<EntityId>,
}

impl GridResource {
    pub fn new(name: EntityName, characteristics: ResourceCharacteristics, calendar: crate::resource::ResourceCalendar, node_to_machine: HashMap<String, MachineId>) -> Self {
        let policy = match characteristics.allocation_model {
            AllocationModel::AdvanceReservation => Policy::Reservation(ArPolicy::new(characteristics)),
            AllocationModel::TimeShared | AllocationModel::SpaceShared => Policy::Basic(AllocationCore::new(characteristics)),
        };
        GridResource { name, policy, calendar, node_to_machine, gis_id: None, stats_sink_id: None }
    }

    pub fn with_gis(mut self, gis_id: EntityId) -> Self {
        self.gis_id = Some(gis_id);
        self
    }

    pub fn with_stats_sink(mut self, stats_sink_id: EntityId) -> Self {
        self.stats_sink_id = Some(stats_sink_id);
        self
    }

    /// Opts an AR-capable resource into accepting immediate (`duration = 0`)
    /// opportunistic reservations. No-op on a non-AR resource.
    pub fn with_opportunistic_reservations(mut self, allow: bool) -> Self {
        if let Policy::Reservation(ar) = &mut self.policy {
            ar.allow_opportunistic_reservations = allow;
        }
        self
    }

    /// `category`/`name` follow the statistics sink's `(category, name, value)` wire
    /// contract, e.g. `("job", "submit")`, `("machine", "failure")`.
    fn record_stat(&self, ctx: &mut EntityContext, category: &str, name: &str, value: f64) {
        if let Some(sink_id) = self.stats_sink_id {
            ctx.schedule(
                sink_id,
                0.0,
                Tag::RecordStatistics,
                Payload::StatEntry { category: category.to_string(), name: name.to_string(), value, timestamp: ctx.now() },
            );
        }
    }

    /// Self-schedules a [`Tag::JobCompletionCheck`] at the job's currently-computed
    /// completion time. No-op if the job is not presently executing.
    fn schedule_completion_check(&self, ctx: &mut EntityContext, job_id: JobId) {
        if let Some(delay) = self.policy.core().completion_delay(job_id) {
            ctx.schedule(ctx.id(), delay, Tag::JobCompletionCheck, Payload::JobId(job_id));
        }
    }

    fn schedule_completion_checks(&self, ctx: &mut EntityContext, job_ids: &[JobId]) {
        for &job_id in job_ids {
            self.schedule_completion_check(ctx, job_id);
        }
    }

    /// Forwards a just-finalised job (`SUCCESS` or `FAILED`) back to its owner, per
    /// §6's unsolicited `ReturnJob` delivery.
    fn return_job(&self, ctx: &mut EntityContext, job: Job) {
        let owner_id = job.owner_id;
        ctx.schedule(owner_id, 0.0, Tag::ReturnJob, Payload::Job(Box::new(job)));
    }

    /// Recomputes the resource's effective load against the calendar's background
    /// load at `ctx.now()` and folds it into the allocation core's accumulator, per
    /// the load-accounting rule run after every admit/completion/cancel.
    fn record_load(&mut self, ctx: &mut EntityContext) {
        let background = self.calendar.background_load_jittered(ctx.now());
        self.policy.core_mut().record_load(background);
    }

    fn handle_submit(&mut self, ctx: &mut EntityContext, event: Event) {
        if let Payload::Job(job) = &event.payload {
            let (job_id, result) = self.policy.core_mut().submit(job.owner_id, job.length_mi, job.requested_pe_count, ctx.now());
            self.record_stat(ctx, "job", "submit", 1.0);
            if let Some(job_id) = job_id {
                self.schedule_completion_check(ctx, job_id);
            }
            self.record_load(ctx);
            ctx.schedule(event.source, 0.0, Tag::ReturnSubmitJob, Payload::SubmitResult(result));
        }
    }

    fn handle_cancel(&mut self, ctx: &mut EntityContext, event: Event) {
        if let Payload::JobId(job_id) = event.payload {
            let (result, job) = self.policy.core_mut().cancel(job_id, ctx.now());
            self.record_load(ctx);
            ctx.schedule(event.source, 0.0, Tag::ReturnCancelJob, Payload::CancelReply(result, job.map(Box::new)));
        }
    }

    fn handle_pause(&mut self, ctx: &mut EntityContext, event: Event) {
        if let Payload::JobId(job_id) = event.payload {
            let result = self.policy.core_mut().pause(job_id, ctx.now());
            self.record_load(ctx);
            ctx.schedule(event.source, 0.0, Tag::ReturnPauseJob, Payload::PauseResult(result));
        }
    }

    fn handle_resume(&mut self, ctx: &mut EntityContext, event: Event) {
        if let Payload::JobId(job_id) = event.payload {
            let result = self.policy.core_mut().resume(job_id, ctx.now());
            if matches!(result, crate::policy::allocation::ResumeResult::Ok { requeued: false }) {
                self.schedule_completion_check(ctx, job_id);
            }
            self.record_load(ctx);
            ctx.schedule(event.source, 0.0, Tag::ReturnResumeJob, Payload::ResumeResult(result));
        }
    }

    fn handle_status(&mut self, ctx: &mut EntityContext, event: Event) {
        if let Payload::JobId(job_id) = event.payload {
            let status = self.policy.core().status(job_id);
            ctx.schedule(event.source, 0.0, Tag::ReturnJobStatus, Payload::JobStatus(status));
        }
    }

    fn handle_move(&mut self, ctx: &mut EntityContext, event: Event) {
        if let Payload::MoveJobRequest { job_id, dest_resource_id } = event.payload {
            let (result, job) = self.policy.core_mut().move_out(job_id, ctx.now());
            match (result, job) {
                (MoveResult::Ok, Some(job)) => {
                    ctx.schedule(dest_resource_id, 0.0, Tag::SubmitJob, Payload::Job(Box::new(job)));
                    ctx.schedule(event.source, 0.0, Tag::ReturnMoveJob, Payload::MoveReply(MoveResult::Ok, None));
                }
                (result, job) => {
                    ctx.schedule(event.source, 0.0, Tag::ReturnMoveJob, Payload::MoveReply(result, job.map(Box::new)));
                }
            }
        }
    }

    /// Handles a completion check for a job's current run segment. Stale if the job
    /// is no longer `INEXEC` (paused, cancelled or failed since this check was
    /// scheduled), in which case this is a silent no-op.
    fn handle_job_completion_check(&mut self, ctx: &mut EntityContext, job_id: JobId) {
        let Some(job) = self.policy.core_mut().finish_success(job_id, ctx.now()) else {
            return;
        };
        self.record_stat(ctx, "job", "success", 1.0);
        let started = self.policy.core_mut().drain_wait_queue(ctx.now());
        self.schedule_completion_checks(ctx, &started);
        self.record_load(ctx);
        self.return_job(ctx, job);
    }

    fn with_ar<F>(&mut self, ctx: &mut EntityContext, source: EntityId, reply_tag: Tag, f: F)
    where
        F: FnOnce(&mut ArPolicy) -> Payload,
    {
        match &mut self.policy {
            Policy::Reservation(ar) => {
                let payload = f(ar);
                ctx.schedule(source, 0.0, reply_tag, payload);
            }
            Policy::Basic(_) => {
                ctx.schedule(source, 0.0, reply_tag, Payload::ArSimpleResult(ArSimpleResult::ErrorResourceCantSupport));
            }
        }
    }

    /// Per §4.6: "Time-zone conversion shifts by `(toZone − fromZone) × 3_600_000` ms."
    fn zone_shift_ms(from_zone: i8, to_zone: i8) -> i64 {
        (to_zone as i64 - from_zone as i64) * 3_600_000
    }

    fn handle_node_transition(&mut self, ctx: &mut EntityContext, node_name: &str, up: bool) {
        let Some(&machine_id) = self.node_to_machine.get(node_name) else {
            log::warn!("failure trace referenced unknown node {node_name:?} on resource {}", self.name);
            return;
        };
        let status = if up { PeStatus::Free } else { PeStatus::Failed };
        if let Some(machine) = self.policy.core_mut().characteristics.machine_mut(machine_id) {
            machine.set_all_pes(status);
        }
        if up {
            let offered = self.policy.core_mut().set_jobs_resumable(machine_id);
            let started = self.policy.core_mut().drain_wait_queue(ctx.now());
            self.schedule_completion_checks(ctx, &started);
            self.record_stat(ctx, "machine", "recovery", if offered { 1.0 } else { 0.0 });
        } else {
            let failed = self.policy.core_mut().set_jobs_failed(machine_id, ctx.now());
            self.record_stat(ctx, "machine", "failure", failed.len() as f64);
            for job in failed {
                self.return_job(ctx, job);
            }
        }
        self.record_load(ctx);
    }
}

/// Shifts every slot's `start_time_ms` from resource-local time into the user's zone,
/// per §4.6's time-query reply contract.
fn shift_slots(slots: Vec<crate::policy::ar::TimeSlot>, shift_ms: i64) -> Vec<crate::policy::ar::TimeSlot> {
    slots.into_iter().map(|s| crate::policy::ar::TimeSlot { start_time_ms: s.start_time_ms + shift_ms, ..s }).collect()
}

impl Entity for GridResource {
    fn name(&self) -> &EntityName {
        &self.name
    }

    fn start(&mut self, ctx: &mut EntityContext) {
        if let Some(gis_id) = self.gis_id {
            let is_ar = matches!(self.policy, Policy::Reservation(_));
            let tag = if is_ar { Tag::RegisterResourceAr } else { Tag::RegisterResource };
            ctx.schedule(gis_id, 0.0, tag, Payload::None);
        }
    }

    fn on_event(&mut self, ctx: &mut EntityContext, event: Event) {
        match event.tag {
            Tag::SubmitJob => self.handle_submit(ctx, event),
            Tag::CancelJob => self.handle_cancel(ctx, event),
            Tag::PauseJob => self.handle_pause(ctx, event),
            Tag::ResumeJob => self.handle_resume(ctx, event),
            Tag::QueryJobStatus => self.handle_status(ctx, event),
            Tag::MoveJob => self.handle_move(ctx, event),

            Tag::JobCompletionCheck => {
                if let Payload::JobId(job_id) = event.payload {
                    self.handle_job_completion_check(ctx, job_id);
                }
            }

            Tag::ArCreate => {
                if let Payload::ArCreateRequest { start_time_ms, duration_ms, requested_pe } = event.payload {
                    let source = event.source;
                    let now_ms = (ctx.now() * 1000.0) as i64;
                    let expiry_time_ms = start_time_ms;
                    let mut created_id = None;
                    self.with_ar(ctx, source, Tag::ReturnArCreate, |ar| {
                        let (result, id, expiry) = ar.create_reservation(source, start_time_ms, duration_ms, requested_pe, expiry_time_ms);
                        created_id = id;
                        Payload::ArCreateResult(result, id, expiry)
                    });
                    if let Some(id) = created_id {
                        let delay = ((expiry_time_ms - now_ms).max(0) as f64) / 1000.0 + EXPIRY_CHECK_EPSILON_S;
                        ctx.schedule(ctx.id(), delay, Tag::ReservationExpiryCheck, Payload::ReservationId(id));
                    }
                }
            }
            Tag::ArCreateImmediate => {
                if let Payload::ArCreateRequest { requested_pe, .. } = event.payload {
                    let source = event.source;
                    let now_ms = (ctx.now() * 1000.0) as i64;
                    self.with_ar(ctx, source, Tag::ReturnArCreate, |ar| {
                        let (result, id, expiry) = ar.create_immediate_reservation(source, now_ms, requested_pe);
                        Payload::ArCreateResult(result, id, expiry)
                    });
                }
            }
            Tag::ArModify => {
                if let Payload::ArModifyRequest { reservation_id, start_time_ms, duration_ms, requested_pe } = event.payload {
                    let source = event.source;
                    self.with_ar(ctx, source, Tag::ReturnArModify, |ar| Payload::ArSimpleResult(ar.modify_reservation(reservation_id, start_time_ms, duration_ms, requested_pe)));
                }
            }
            Tag::ArCancel => {
                if let Payload::ArCancelRequest { reservation_id, job_ids } = event.payload {
                    let source = event.source;
                    let now = ctx.now();
                    let mut cancelled = Vec::new();
                    self.with_ar(ctx, source, Tag::ReturnArCancel, |ar| {
                        let (result, jobs) = ar.cancel_reservation(reservation_id, job_ids.as_deref(), now);
                        cancelled = jobs;
                        Payload::ArSimpleResult(result)
                    });
                    for job in cancelled {
                        self.return_job(ctx, job);
                    }
                }
            }
            Tag::ArCommit => {
                if let Payload::ArCommitRequest { reservation_id, job } = event.payload {
                    let source = event.source;
                    let mut admitted_job_id = None;
                    let payload = match &mut self.policy {
                        Policy::Reservation(ar) => match job {
                            Some(job) => {
                                let (result, job_id) = ar.commit_reservation(reservation_id, job.owner_id, job.length_mi, job.requested_pe_count, ctx.now());
                                admitted_job_id = job_id;
                                Payload::ArCommitResult(result, job_id)
                            }
                            None => Payload::ArCommitResult(ar.commit_only(reservation_id, (ctx.now() * 1000.0) as i64), None),
                        },
                        Policy::Basic(_) => Payload::ArCommitResult(ArSimpleResult::ErrorResourceCantSupport, None),
                    };
                    if let Some(job_id) = admitted_job_id {
                        self.schedule_completion_check(ctx, job_id);
                        self.record_load(ctx);
                    }
                    ctx.schedule(source, 0.0, Tag::ReturnArCommit, payload);
                }
            }
            Tag::ArQueryStatus => {
                if let Payload::ArQueryStatusRequest { reservation_id } = event.payload {
                    let source = event.source;
                    let now_ms = (ctx.now() * 1000.0) as i64;
                    self.with_ar(ctx, source, Tag::ReturnArQueryStatus, |ar| Payload::ArQueryResult(ar.query_status(reservation_id, now_ms)));
                }
            }
            Tag::ArQueryBusyTime => {
                if let Payload::ArQueryTimeRequest { from_time_ms, to_time_ms, user_time_zone } = event.payload {
                    let source = event.source;
                    let shift_ms = Self::zone_shift_ms(self.policy.core().characteristics.resource_time_zone, user_time_zone);
                    self.with_ar(ctx, source, Tag::ReturnArQueryBusyTime, |ar| Payload::ArQueryTimeResult(shift_slots(ar.query_busy_time(from_time_ms, to_time_ms), shift_ms)));
                }
            }
            Tag::ArQueryFreeTime => {
                if let Payload::ArQueryTimeRequest { from_time_ms, to_time_ms, user_time_zone } = event.payload {
                    let source = event.source;
                    let shift_ms = Self::zone_shift_ms(self.policy.core().characteristics.resource_time_zone, user_time_zone);
                    self.with_ar(ctx, source, Tag::ReturnArQueryFreeTime, |ar| Payload::ArQueryTimeResult(shift_slots(ar.query_free_time(from_time_ms, to_time_ms), shift_ms)));
                }
            }

            Tag::ReservationExpiryCheck => {
                if let Payload::ReservationId(reservation_id) = event.payload {
                    if let Policy::Reservation(ar) = &mut self.policy {
                        let now_ms = (ctx.now() * 1000.0) as i64;
                        let expired = ar.expire_overdue(now_ms);
                        if expired.contains(&reservation_id) {
                            self.record_stat(ctx, "reservation", "expired", 1.0);
                        }
                    }
                }
            }

            Tag::NodeFailure => {
                if let Payload::NodeId(node) = event.payload {
                    self.handle_node_transition(ctx, &node, false);
                }
            }
            Tag::NodeRecovery => {
                if let Payload::NodeId(node) = event.payload {
                    self.handle_node_transition(ctx, &node, true);
                }
            }

            Tag::EndOfSimulation => {
                ctx.terminate();
            }

            _ => {}
        }
    }
}
