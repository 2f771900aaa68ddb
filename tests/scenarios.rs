//! End-to-end scenarios driving [`GridResource`] through the real [`Engine`], covering
//! the cases that only show up once submission, completion and failure are wired
//! through actual event dispatch rather than called directly on the allocation core.
//!
//! Pause/resume and cancel-mid-execution are exercised at the `AllocationCore` level in
//! `policy::allocation`'s own tests; there's nothing additional to learn about them by
//! routing through the engine, since `GridResource`'s handlers for those verbs are thin
//! pass-throughs.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use gridsim_kernel::engine::core::Engine;
use gridsim_kernel::engine::entity::{Entity, EntityContext};
use gridsim_kernel::engine::event::{Event, Payload, Tag};
use gridsim_kernel::engine::ids::{EntityId, EntityName};
use gridsim_kernel::grid_resource::GridResource;
use gridsim_kernel::job::{Job, JobId, JobStatus};
use gridsim_kernel::policy::ar::{ArCreateResult, ArSimpleResult, ReservationId};
use gridsim_kernel::resource::{AllocationModel, Machine, MachineId, ResourceCalendar, ResourceCharacteristics};

fn no_load_calendar() -> ResourceCalendar {
    ResourceCalendar::new([0.0; 24], [0.0; 24], HashSet::new(), HashSet::new(), 0, 0)
}

fn single_machine_resource(pe_count: u32, mips_rating: i64, node_name: &str) -> GridResource {
    let characteristics = ResourceCharacteristics { machines: vec![Machine::new(MachineId(0), pe_count, mips_rating, 0)], allocation_model: AllocationModel::SpaceShared, cost_per_sec: 0.1, resource_time_zone: 0 };
    let node_to_machine = HashMap::from([(node_name.to_string(), MachineId(0))]);
    GridResource::new(EntityName::new("resource-0"), characteristics, no_load_calendar(), node_to_machine)
}

fn ar_resource(pe_count: u32, mips_rating: i64) -> GridResource {
    let characteristics = ResourceCharacteristics { machines: vec![Machine::new(MachineId(0), pe_count, mips_rating, 0)], allocation_model: AllocationModel::AdvanceReservation, cost_per_sec: 0.2, resource_time_zone: 0 };
    GridResource::new(EntityName::new("resource-0"), characteristics, no_load_calendar(), HashMap::new())
}

/// Captures every `ReturnJob` delivery it receives, in arrival order.
struct RecordingOwner {
    name: EntityName,
    received: Rc<RefCell<Vec<Job>>>,
}

impl Entity for RecordingOwner {
    fn name(&self) -> &EntityName {
        &self.name
    }

    fn on_event(&mut self, _ctx: &mut EntityContext, event: Event) {
        if event.tag == Tag::ReturnJob {
            if let Payload::Job(job) = event.payload {
                self.received.borrow_mut().push(*job);
            }
        }
    }
}

fn register_owner(engine: &mut Engine) -> (EntityId, Rc<RefCell<Vec<Job>>>) {
    let received = Rc::new(RefCell::new(Vec::new()));
    let id = engine.register(Box::new(RecordingOwner { name: EntityName::new("owner"), received: received.clone() }));
    (id, received)
}

#[test]
fn s1_plain_submit_finishes_at_length_over_mips() {
    let mut engine = Engine::new();
    let resource_id = engine.register(Box::new(single_machine_resource(4, 1000, "node-a")));
    let (owner_id, received) = register_owner(&mut engine);

    let job = Job::new(JobId::default(), owner_id, 4_000, 1, 0.0);
    engine.schedule(owner_id, resource_id, 0.0, Tag::SubmitJob, Payload::Job(Box::new(job)), None);
    engine.schedule(owner_id, owner_id, 10.0, Tag::EndOfSimulation, Payload::None, None);
    engine.run();

    let received = received.borrow();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].status, JobStatus::Success);
    assert_eq!(received[0].finished_so_far_mi, 4_000);
    assert_eq!(received[0].finish_time, Some(4.0));
}

#[test]
fn s1_two_jobs_share_space_without_interfering() {
    // Two 1-PE, 4000 MI jobs on a 4-PE machine both run concurrently and finish
    // independently at the same time, since space-sharing never delays either.
    let mut engine = Engine::new();
    let resource_id = engine.register(Box::new(single_machine_resource(4, 1000, "node-a")));
    let (owner_id, received) = register_owner(&mut engine);

    let job_a = Job::new(JobId::default(), owner_id, 4_000, 1, 0.0);
    let job_b = Job::new(JobId::default(), owner_id, 2_000, 1, 0.0);
    engine.schedule(owner_id, resource_id, 0.0, Tag::SubmitJob, Payload::Job(Box::new(job_a)), None);
    engine.schedule(owner_id, resource_id, 0.0, Tag::SubmitJob, Payload::Job(Box::new(job_b)), None);
    engine.schedule(owner_id, owner_id, 10.0, Tag::EndOfSimulation, Payload::None, None);
    engine.run();

    let mut finish_times: Vec<Option<f64>> = received.borrow().iter().map(|j| j.finish_time).collect();
    finish_times.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(finish_times, vec![Some(2.0), Some(4.0)]);
}

#[test]
fn s6_failure_injection_returns_running_jobs_failed_and_frees_pes_on_recovery() {
    let mut engine = Engine::new();
    let resource_id = engine.register(Box::new(single_machine_resource(2, 1000, "node-a")));
    let (owner_id, received) = register_owner(&mut engine);

    // Two 1-PE jobs, long enough to still be running when the machine fails at t=5.
    let job_a = Job::new(JobId::default(), owner_id, 100_000, 1, 0.0);
    let job_b = Job::new(JobId::default(), owner_id, 100_000, 1, 0.0);
    engine.schedule(owner_id, resource_id, 0.0, Tag::SubmitJob, Payload::Job(Box::new(job_a)), None);
    engine.schedule(owner_id, resource_id, 0.0, Tag::SubmitJob, Payload::Job(Box::new(job_b)), None);

    engine.schedule(owner_id, resource_id, 5.0, Tag::NodeFailure, Payload::NodeId("node-a".to_string()), None);
    engine.schedule(owner_id, resource_id, 10.0, Tag::NodeRecovery, Payload::NodeId("node-a".to_string()), None);
    engine.schedule(owner_id, owner_id, 20.0, Tag::EndOfSimulation, Payload::None, None);
    engine.run();

    let received = received.borrow();
    assert_eq!(received.len(), 2, "both jobs running on the failed machine should be returned exactly once");
    for job in received.iter() {
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.finish_time, Some(5.0));
        // Each ran for 5s at 1000 MIPS before the machine failed.
        assert_eq!(job.finished_so_far_mi, 5_000);
    }
    // No spontaneous re-run: recovery alone never delivers a second ReturnJob for
    // jobs the policy didn't mark resumable.
    assert_eq!(received.len(), 2);
}

#[test]
fn s6_unknown_node_name_is_ignored_rather_than_panicking() {
    let mut engine = Engine::new();
    let resource_id = engine.register(Box::new(single_machine_resource(2, 1000, "node-a")));
    let (owner_id, received) = register_owner(&mut engine);

    engine.schedule(owner_id, resource_id, 1.0, Tag::NodeFailure, Payload::NodeId("no-such-node".to_string()), None);
    engine.schedule(owner_id, owner_id, 5.0, Tag::EndOfSimulation, Payload::None, None);
    engine.run();

    assert!(received.borrow().is_empty());
}

/// Captures the `Payload::JobStatus` reply of a single `QueryJobStatus` request.
struct StatusCollector {
    name: EntityName,
    resource_id: EntityId,
    query_job_id: JobId,
    result: Rc<RefCell<Option<Option<JobStatus>>>>,
}

impl Entity for StatusCollector {
    fn name(&self) -> &EntityName {
        &self.name
    }

    fn start(&mut self, ctx: &mut EntityContext) {
        ctx.schedule(self.resource_id, 0.0, Tag::QueryJobStatus, Payload::JobId(self.query_job_id));
    }

    fn on_event(&mut self, ctx: &mut EntityContext, event: Event) {
        if event.tag == Tag::ReturnJobStatus {
            if let Payload::JobStatus(status) = event.payload {
                *self.result.borrow_mut() = Some(status);
            }
            ctx.terminate();
        }
    }
}

#[test]
fn query_status_of_unknown_job_id_reports_none_rather_than_a_fabricated_status() {
    let mut engine = Engine::new();
    let resource_id = engine.register(Box::new(single_machine_resource(2, 1000, "node-a")));
    let result = Rc::new(RefCell::new(None));
    engine.register(Box::new(StatusCollector { name: EntityName::new("collector"), resource_id, query_job_id: JobId::default(), result: result.clone() }));

    engine.run();

    assert_eq!(*result.borrow(), Some(None), "an id this resource never admitted must report None, not Failed");
}

/// Drives the create -> commit-with-gridlet AR protocol against a resource and
/// records every reply it receives, so `GridResource`'s tag dispatch for the AR verbs
/// gets exercised through the real engine rather than only at the `ArPolicy` level.
struct ArHappyPathDriver {
    name: EntityName,
    resource_id: EntityId,
    start_time_ms: i64,
    duration_ms: i64,
    requested_pe: u32,
    job_length_mi: i64,
    create_result: Rc<RefCell<Option<(ArCreateResult, Option<ReservationId>, Option<i64>)>>>,
    commit_result: Rc<RefCell<Option<ArSimpleResult>>>,
    returned_job: Rc<RefCell<Option<Job>>>,
}

impl Entity for ArHappyPathDriver {
    fn name(&self) -> &EntityName {
        &self.name
    }

    fn start(&mut self, ctx: &mut EntityContext) {
        ctx.schedule(self.resource_id, 0.0, Tag::ArCreate, Payload::ArCreateRequest { start_time_ms: self.start_time_ms, duration_ms: self.duration_ms, requested_pe: self.requested_pe });
    }

    fn on_event(&mut self, ctx: &mut EntityContext, event: Event) {
        match event.tag {
            Tag::ReturnArCreate => {
                if let Payload::ArCreateResult(result, id, expiry) = event.payload {
                    *self.create_result.borrow_mut() = Some((result, id, expiry));
                    if let Some(reservation_id) = id {
                        let job = Job::new(JobId::default(), ctx.id(), self.job_length_mi, self.requested_pe, ctx.now());
                        let delay = (self.start_time_ms as f64) / 1000.0 - ctx.now();
                        ctx.schedule(self.resource_id, delay.max(0.0), Tag::ArCommit, Payload::ArCommitRequest { reservation_id, job: Some(Box::new(job)) });
                    }
                }
            }
            Tag::ReturnArCommit => {
                if let Payload::ArCommitResult(result, _job_id) = event.payload {
                    *self.commit_result.borrow_mut() = Some(result);
                }
            }
            Tag::ReturnJob => {
                if let Payload::Job(job) = event.payload {
                    *self.returned_job.borrow_mut() = Some(*job);
                }
            }
            _ => {}
        }
    }
}

#[test]
fn s3_ar_create_and_commit_happy_path_runs_the_job_to_completion() {
    let mut engine = Engine::new();
    let resource_id = engine.register(Box::new(ar_resource(4, 1000)));

    let create_result = Rc::new(RefCell::new(None));
    let commit_result = Rc::new(RefCell::new(None));
    let returned_job = Rc::new(RefCell::new(None));
    let driver_id = engine.register(Box::new(ArHappyPathDriver {
        name: EntityName::new("driver"),
        resource_id,
        start_time_ms: 10_000,
        duration_ms: 5_000,
        requested_pe: 2,
        job_length_mi: 5_000,
        create_result: create_result.clone(),
        commit_result: commit_result.clone(),
        returned_job: returned_job.clone(),
    }));
    engine.schedule(driver_id, driver_id, 20.0, Tag::EndOfSimulation, Payload::None, None);
    engine.run();

    let (result, reservation_id, expiry) = create_result.borrow().expect("AR_CREATE should have replied");
    assert_eq!(result, ArCreateResult::Ok);
    assert!(reservation_id.is_some());
    assert_eq!(expiry, Some(10_000), "AR_CREATE_OK must carry the commit deadline back to the initiator");
    assert_eq!(*commit_result.borrow(), Some(ArSimpleResult::Ok));

    let returned_job = returned_job.borrow();
    let job = returned_job.as_ref().expect("committed job should run to completion and be returned");
    assert_eq!(job.status, JobStatus::Success);
    // Committed at t=10 (PE=2 at 1000 MIPS each -> 2000 MI/s), 5000 MI finishes at t=12.5.
    assert_eq!(job.finish_time, Some(12.5));
}

#[test]
fn s4_ar_create_against_a_full_window_fails_with_the_rounded_busy_bucket() {
    let mut engine = Engine::new();
    let resource_id = engine.register(Box::new(ar_resource(4, 1000)));

    // First reservation occupies all 4 PEs over [10s, 20s) and is committed (so the
    // second create's admission test sees it as occupied capacity).
    let first_create = Rc::new(RefCell::new(None));
    let first_commit = Rc::new(RefCell::new(None));
    let first_job = Rc::new(RefCell::new(None));
    let filler_id = engine.register(Box::new(ArHappyPathDriver {
        name: EntityName::new("filler"),
        resource_id,
        start_time_ms: 10_000,
        duration_ms: 10_000,
        requested_pe: 4,
        job_length_mi: 0,
        create_result: first_create.clone(),
        commit_result: first_commit.clone(),
        returned_job: first_job.clone(),
    }));

    // Second request overlaps [12s, 14s) asking for just 1 PE: the resource cannot
    // fit it until the first reservation's window ends at t=20s (8s after the
    // request's own start of t=12s), which rounds up to the 10-second bucket.
    struct SecondCreateDriver {
        name: EntityName,
        resource_id: EntityId,
        result: Rc<RefCell<Option<(ArCreateResult, Option<ReservationId>, Option<i64>)>>>,
    }
    impl Entity for SecondCreateDriver {
        fn name(&self) -> &EntityName {
            &self.name
        }
        fn on_event(&mut self, ctx: &mut EntityContext, event: Event) {
            if event.tag == Tag::Wakeup {
                ctx.schedule(self.resource_id, 0.0, Tag::ArCreate, Payload::ArCreateRequest { start_time_ms: 12_000, duration_ms: 2_000, requested_pe: 1 });
            } else if let Tag::ReturnArCreate = event.tag {
                if let Payload::ArCreateResult(result, id, expiry) = event.payload {
                    *self.result.borrow_mut() = Some((result, id, expiry));
                }
            }
        }
    }
    let second_result = Rc::new(RefCell::new(None));
    let second_id = engine.register(Box::new(SecondCreateDriver { name: EntityName::new("second"), resource_id, result: second_result.clone() }));
    // Fire after the filler has committed (commit happens at t=10 once the filler's
    // ReturnArCreate arrives at t=0), well before the overlap window at t=12.
    engine.schedule(second_id, second_id, 11.0, Tag::Wakeup, Payload::None, None);
    engine.schedule(filler_id, filler_id, 25.0, Tag::EndOfSimulation, Payload::None, None);
    engine.run();

    assert_eq!(first_create.borrow().unwrap().0, ArCreateResult::Ok);
    assert_eq!(*first_commit.borrow(), Some(ArSimpleResult::Ok));

    let (result, id, expiry) = second_result.borrow().expect("second AR_CREATE should have replied");
    assert!(id.is_none());
    assert!(expiry.is_none());
    match result {
        ArCreateResult::FailResourceFullIn { bucket_seconds } => assert_eq!(bucket_seconds, 10),
        other => panic!("expected FAIL_RESOURCE_FULL_IN_10_SEC, got {other:?}"),
    }
}
