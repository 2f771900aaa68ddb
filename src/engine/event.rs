use serde::{Deserialize, Serialize};

use crate::engine::ids::{EntityId, TransactionId};
use crate::job::{Job, JobId, JobStatus};
use crate::policy::allocation::{CancelResult, MoveResult, PauseResult, ResumeResult, SubmitResult};
use crate::policy::ar::reply::{ArCreateResult, ArQueryResult, ArSimpleResult, TimeSlot};
use crate::policy::ar::timeline::ReservationId;

/// Discriminates the meaning of an [`Event`]'s payload, playing the role the original
/// design's integer event tags play, but as a closed Rust enum instead of magic numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tag {
    /// Self-scheduled wakeup with no payload, used by [`crate::engine::entity::EntityContext::pause`].
    Wakeup,

    SubmitJob,
    ReturnSubmitJob,
    CancelJob,
    ReturnCancelJob,
    PauseJob,
    ReturnPauseJob,
    ResumeJob,
    ReturnResumeJob,
    QueryJobStatus,
    ReturnJobStatus,
    MoveJob,
    ReturnMoveJob,
    /// Unsolicited delivery of a job that just reached a terminal state (`SUCCESS` via
    /// normal completion, or `FAILED` via failure injection) back to its owner. The
    /// "return" tag of §6's job lifecycle range.
    ReturnJob,
    /// Self-addressed: fires when a job's current run segment is expected to finish,
    /// carrying `Payload::JobId`. Stale if the job is no longer `INEXEC` on arrival.
    JobCompletionCheck,
    /// Self-addressed: fires at a pending reservation's `expiryTime`, carrying
    /// `Payload::ReservationId`, so an uncommitted reservation is swept to `EXPIRED`.
    ReservationExpiryCheck,

    ArCreate,
    ReturnArCreate,
    ArCreateImmediate,
    ArModify,
    ReturnArModify,
    ArCancel,
    ReturnArCancel,
    ArCommit,
    ReturnArCommit,
    ArQueryStatus,
    ReturnArQueryStatus,
    ArQueryBusyTime,
    ReturnArQueryBusyTime,
    ArQueryFreeTime,
    ReturnArQueryFreeTime,

    RegisterResource,
    RegisterResourceAr,
    ResourceList,
    ReturnResourceList,
    ResourceListAr,
    ReturnResourceListAr,
    /// Registers a regional GIS with this (presumably top-level) GIS, per §4.3's "list
    /// of regional-GIS ids". Regional GIS fan-out and hierarchy are otherwise out of
    /// scope (§1); this crate only tracks the id set for shutdown fan-out purposes.
    RegisterRegionalGis,
    /// Registers a network link entity, an out-of-scope collaborator (§1) whose id GIS
    /// still tracks so it receives `EndOfSimulation` at shutdown.
    RegisterLink,
    /// Registers a network router entity; see [`Tag::RegisterLink`].
    RegisterRouter,

    RecordStatistics,
    ReturnAccStatisticsByCategory,

    ResourceCharacteristicsRequest,
    ReturnResourceCharacteristics,

    NodeFailure,
    NodeRecovery,

    EndOfSimulation,
}

/// Per-message payload. Exactly one variant is meaningful for a given [`Tag`]; the
/// pairing is enforced by the sending and receiving entities, not by the type system,
/// mirroring how the original wire protocol multiplexes one untyped object field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Payload {
    None,
    Job(Box<Job>),
    JobId(JobId),
    /// Reply to `QueryJobStatus`: `None` means this resource has no record of the job
    /// id at all, distinct from any real terminal status (`Failed` included) per
    /// §4.5's "returns one of the Job status codes or -1 if unknown" contract.
    JobStatus(Option<JobStatus>),

    SubmitResult(SubmitResult),
    /// Reply to `CancelJob`: the result code plus a `Job` the sender can use to locate
    /// what happened, per §4.5's "always replies with either the cancelled Job (status
    /// CANCELED) or, if not found/already finished, a synthetic Job with status
    /// FAILED" contract. Only ever `None` if the policy layer declines to answer at
    /// all, which the base allocation core never does.
    CancelReply(CancelResult, Option<Box<Job>>),
    PauseResult(PauseResult),
    ResumeResult(ResumeResult),
    MoveJobRequest { job_id: JobId, dest_resource_id: EntityId },
    MoveReply(MoveResult, Option<Box<Job>>),

    ArCreateRequest { start_time_ms: i64, duration_ms: i64, requested_pe: u32 },
    /// Reply to `ArCreate`/`ArCreateImmediate`: per S3's `AR_CREATE_OK(rid, expiry)`,
    /// carries the reservation id and its commit deadline alongside the result code,
    /// both `Some` on success and `None` on failure.
    ArCreateResult(ArCreateResult, Option<ReservationId>, Option<i64>),
    ArModifyRequest { reservation_id: ReservationId, start_time_ms: i64, duration_ms: i64, requested_pe: u32 },
    ArSimpleResult(ArSimpleResult),
    ArCommitResult(ArSimpleResult, Option<JobId>),
    /// `job_ids = None` cancels the whole reservation (every attached job, and the
    /// reservation itself); `Some(ids)` cancels only the named jobs, per §4.6's three
    /// cancel overloads.
    ArCancelRequest { reservation_id: ReservationId, job_ids: Option<Vec<JobId>> },
    ReservationId(ReservationId),
    ArCommitRequest { reservation_id: ReservationId, job: Option<Box<Job>> },
    ArQueryStatusRequest { reservation_id: ReservationId },
    ArQueryResult(ArQueryResult),
    /// `user_time_zone`: hours offset from UTC of the querying user, in `[-12, 12]`.
    /// Per §4.6, the resource computes in its own local time and converts each
    /// returned slot's `start_time_ms` into this zone before replying.
    ArQueryTimeRequest { from_time_ms: i64, to_time_ms: i64, user_time_zone: i8 },
    ArQueryTimeResult(Vec<TimeSlot>),

    EntityIds(Vec<EntityId>),

    StatEntry { category: String, name: String, value: f64, timestamp: f64 },
    /// Reply to `ReturnAccStatisticsByCategory`: the full accumulator folded from every
    /// in-memory-logged sample matching the requested category, per §4.8.
    AccumulatorSnapshot(crate::stats::Accumulator),

    NodeId(String),

    ErrorMessage(String),
}

/// A unit of work moving through the engine's future-event queue: a message sent by
/// `source` to `dest`, to be delivered at `delivery_time` and, once delivered, appended
/// to `dest`'s deferred queue for later retrieval via `get_next_event`.
///
/// `sequence` breaks ties between events scheduled for the same `delivery_time`,
/// preserving submission order (FIFO-within-tie), and also orders an entity's own
/// `EndOfSimulation`/self-wakeup ahead of or behind externally sent events as the
/// sender intended.
#[derive(Debug, Clone)]
pub struct Event {
    pub source: EntityId,
    pub dest: EntityId,
    pub send_time: f64,
    pub delivery_time: f64,
    pub sequence: u64,
    pub tag: Tag,
    pub payload: Payload,
    pub transaction_id: Option<TransactionId>,
}

impl Event {
    pub fn new(source: EntityId, dest: EntityId, send_time: f64, delivery_time: f64, sequence: u64, tag: Tag, payload: Payload) -> Self {
        Event { source, dest, send_time, delivery_time, sequence, tag, payload, transaction_id: None }
    }

    pub fn with_transaction(mut self, transaction_id: TransactionId) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.delivery_time == other.delivery_time && self.sequence == other.sequence
    }
}
impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    /// Reversed so a [`std::collections::BinaryHeap`] (a max-heap) pops the
    /// earliest-delivery-time, lowest-sequence event first.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .delivery_time
            .partial_cmp(&self.delivery_time)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Network-carried data envelope: wraps a byte payload addressed to a destination
/// entity at a requested network service level. Jobs submitted with an explicit
/// `network_service_level` override the resource's default for that one transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoEnvelope {
    pub byte_size: i64,
    pub dest_id: EntityId,
    pub net_service_level: u32,
}

impl IoEnvelope {
    pub fn new(byte_size: i64, dest_id: EntityId, net_service_level: u32) -> Self {
        IoEnvelope { byte_size, dest_id, net_service_level }
    }

    /// Resolves the service level to use for this transfer: the job's own override if
    /// nonzero, otherwise the resource's default.
    pub fn effective_service_level(&self, resource_default: u32) -> u32 {
        if self.net_service_level != 0 {
            self.net_service_level
        } else {
            resource_default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    fn ev(delivery_time: f64, sequence: u64) -> Event {
        let mut map: slotmap::SlotMap<EntityId, ()> = slotmap::SlotMap::with_key();
        let id = map.insert(());
        Event::new(id, id, 0.0, delivery_time, sequence, Tag::Wakeup, Payload::None)
    }

    #[test]
    fn heap_pops_earliest_delivery_time_first() {
        let mut heap = BinaryHeap::new();
        heap.push(ev(5.0, 0));
        heap.push(ev(1.0, 1));
        heap.push(ev(3.0, 2));

        assert_eq!(heap.pop().unwrap().delivery_time, 1.0);
        assert_eq!(heap.pop().unwrap().delivery_time, 3.0);
        assert_eq!(heap.pop().unwrap().delivery_time, 5.0);
    }

    #[test]
    fn heap_breaks_ties_by_sequence() {
        let mut heap = BinaryHeap::new();
        heap.push(ev(2.0, 7));
        heap.push(ev(2.0, 3));
        heap.push(ev(2.0, 5));

        assert_eq!(heap.pop().unwrap().sequence, 3);
        assert_eq!(heap.pop().unwrap().sequence, 5);
        assert_eq!(heap.pop().unwrap().sequence, 7);
    }
}
