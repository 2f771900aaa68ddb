use serde::{Deserialize, Serialize};

use crate::engine::ids::EntityId;

slotmap::new_key_type! {
    /// Resource-local handle for a job admitted onto that resource's allocation policy.
    /// Scoped per resource, not globally unique: the same numeric value on two different
    /// resources refers to two unrelated jobs.
    pub struct JobId;
}

/// Lifecycle state of a [`Job`]. See the module invariants on [`Job`] for the legal
/// transitions this type participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Created,
    Ready,
    Queued,
    InExec,
    Paused,
    Resumed,
    Success,
    Failed,
    Canceled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed | JobStatus::Canceled)
    }
}

/// A unit of work submitted by a user entity to a resource ("Gridlet" in the domain's
/// terminology).
///
/// Invariants upheld by every policy operating on a `Job`:
/// - `finished_so_far_mi` is monotonically non-decreasing while the job runs.
/// - once `status` reaches a terminal state, `finished_so_far_mi <= length_mi`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub owner_id: EntityId,
    pub length_mi: i64,
    pub input_size: i64,
    pub output_size: i64,
    pub requested_pe_count: u32,
    pub class_type: i32,
    pub network_service_level: u32,
    pub submission_time: f64,
    pub exec_start_time: Option<f64>,
    pub finish_time: Option<f64>,
    pub status: JobStatus,
    pub cost_per_sec: f64,
    pub finished_so_far_mi: i64,
}

impl Job {
    pub fn new(job_id: JobId, owner_id: EntityId, length_mi: i64, requested_pe_count: u32, submission_time: f64) -> Self {
        Job {
            job_id,
            owner_id,
            length_mi,
            input_size: 0,
            output_size: 0,
            requested_pe_count,
            class_type: 0,
            network_service_level: 0,
            submission_time,
            exec_start_time: None,
            finish_time: None,
            status: JobStatus::Created,
            cost_per_sec: 0.0,
            finished_so_far_mi: 0,
        }
    }

    pub fn remaining_mi(&self) -> i64 {
        (self.length_mi - self.finished_so_far_mi).max(0)
    }

    pub fn wall_clock_time(&self) -> Option<f64> {
        match self.finish_time {
            Some(end) => Some(end - self.submission_time),
            None => None,
        }
    }
}
