use serde::{Deserialize, Serialize};

use crate::engine::ids::EntityId;
use crate::job::{Job, JobId, JobStatus, ResidentJob};
use crate::resource::{MachineId, PeStatus, ResourceCharacteristics};
use crate::stats::Accumulator;

/// Outcome of [`AllocationCore::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmitResult {
    /// Job was accepted; `job_id` is the resource-local handle the submitter must use
    /// to address a later cancel/pause/resume/status/move at this job, and `started`
    /// is true if it began executing immediately rather than sitting in the wait
    /// queue. Per §4.5, the submit-ack "send[s] back `(jobId, success)`".
    Accepted { job_id: JobId, started: bool },
    /// Resource cannot ever satisfy the request (asks for more PEs than exist).
    CantSupport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelResult {
    Ok,
    /// The job was already in a terminal state before this cancel arrived; the reply
    /// still carries that finalised `Job` so the sender can locate it, per §4.5.
    AlreadyFinished,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PauseResult {
    Ok,
    NotFound,
    /// Job is already paused, queued, or terminal; pausing it is not meaningful.
    NotRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResumeResult {
    Ok { requeued: bool },
    NotFound,
    NotPaused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveResult {
    Ok,
    AlreadyFinished,
    NotFound,
}

/// The base (non-AR) resource allocation policy: space-shared assignment of jobs onto
/// PEs, with a FIFO wait queue for requests that cannot be satisfied immediately.
///
/// An [`crate::policy::ar::ArPolicy`] embeds one of these and reuses it verbatim for
/// every non-AR verb; advance-reservation admission only changes how PEs get carved out
/// ahead of time, not how a job actually runs once it is placed.
#[derive(Debug)]
pub struct AllocationCore {
    pub characteristics: ResourceCharacteristics,
    jobs: slotmap::SlotMap<JobId, ResidentJob>,
    wait_queue: Vec<JobId>,
    pub load_accumulator: Accumulator,
}

impl AllocationCore {
    pub fn new(characteristics: ResourceCharacteristics) -> Self {
        AllocationCore { characteristics, jobs: slotmap::SlotMap::with_key(), wait_queue: Vec::new(), load_accumulator: Accumulator::new() }
    }

    pub fn job(&self, job_id: JobId) -> Option<&ResidentJob> {
        self.jobs.get(job_id)
    }

    pub fn job_mut(&mut self, job_id: JobId) -> Option<&mut ResidentJob> {
        self.jobs.get_mut(job_id)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &ResidentJob> {
        self.jobs.values()
    }

    fn in_exec_count(&self) -> u32 {
        self.jobs.values().filter(|rj| rj.job.status == JobStatus::InExec).count() as u32
    }

    /// Current load fraction accounting for both background load and running jobs,
    /// per the formula `1 - (1 - background_load) / ceil((in_exec + 1) / total_pe)`.
    pub fn effective_load(&self, background_load: f64) -> f64 {
        let total_pe = self.characteristics.total_pe_count().max(1) as f64;
        let in_exec = self.in_exec_count() as f64;
        let divisor = ((in_exec + 1.0) / total_pe).ceil().max(1.0);
        1.0 - (1.0 - background_load) / divisor
    }

    /// Recomputes [`Self::effective_load`] against `background_load` and folds it into
    /// `load_accumulator`, per the load-accounting rule run after every admit or
    /// completion.
    pub fn record_load(&mut self, background_load: f64) {
        let load = self.effective_load(background_load).clamp(0.0, 1.0);
        self.load_accumulator.add(load);
    }

    fn pick_machine_with_capacity(&self, requested_pe: u32) -> Option<MachineId> {
        self.characteristics.machines.iter().find(|m| m.free_pe_count() >= requested_pe).map(|m| m.machine_id)
    }

    fn try_place(&mut self, job_id: JobId, now: f64) -> bool {
        let requested = self.jobs.get(job_id).map(|rj| rj.job.requested_pe_count).unwrap_or(0);
        let Some(machine_id) = self.pick_machine_with_capacity(requested) else {
            return false;
        };
        let mips = self.characteristics.machines.iter().find(|m| m.machine_id == machine_id).map(|m| m.mips_rating()).unwrap_or(0);
        let pe_ids = self.characteristics.machine_mut(machine_id).map(|m| m.allocate(requested)).unwrap_or_default();
        if pe_ids.len() < requested as usize {
            if let Some(m) = self.characteristics.machine_mut(machine_id) {
                m.release(&pe_ids);
            }
            return false;
        }
        if let Some(rj) = self.jobs.get_mut(job_id) {
            rj.assigned_machine = Some(machine_id);
            rj.assigned_pe_count = requested;
            let rate = (mips as f64) * (requested as f64);
            rj.begin_segment(now, rate);
            rj.job.status = JobStatus::InExec;
            if rj.job.exec_start_time.is_none() {
                rj.job.exec_start_time = Some(now);
            }
        }
        true
    }

    /// Wall-clock seconds until the job's current run segment would finish its
    /// remaining MI, for the caller to self-schedule a completion check. `None` if the
    /// job is not currently executing (already terminal, queued, or paused).
    pub fn completion_delay(&self, job_id: JobId) -> Option<f64> {
        self.jobs.get(job_id).and_then(|rj| rj.remaining_segment_duration())
    }

    /// Finalises a job whose run segment has reached its computed completion time:
    /// marks it `SUCCESS`, releases its PEs, and removes its resident record (the
    /// caller is expected to hand the returned [`Job`] back to its owner). Returns
    /// `None` if the job is no longer `INEXEC` (it was paused, cancelled, or failed in
    /// the meantime and this completion check is stale).
    pub fn finish_success(&mut self, job_id: JobId, now: f64) -> Option<Job> {
        let rj = self.jobs.get_mut(job_id)?;
        if rj.job.status != JobStatus::InExec {
            return None;
        }
        rj.end_segment(now);
        rj.job.finished_so_far_mi = rj.job.length_mi;
        rj.job.status = JobStatus::Success;
        rj.job.finish_time = Some(now);
        let job = rj.job.clone();
        self.release_job_pes(job_id);
        Some(job)
    }

    fn release_job_pes(&mut self, job_id: JobId) {
        if let Some(rj) = self.jobs.get(job_id) {
            if let Some(machine_id) = rj.assigned_machine {
                let pe_count = rj.assigned_pe_count;
                if let Some(m) = self.characteristics.machine_mut(machine_id) {
                    let ids: Vec<_> = m.pes.iter().filter(|pe| pe.status == PeStatus::Busy).take(pe_count as usize).map(|pe| pe.pe_id).collect();
                    m.release(&ids);
                }
            }
        }
        if let Some(rj) = self.jobs.get_mut(job_id) {
            rj.assigned_machine = None;
            rj.assigned_pe_count = 0;
        }
    }

    /// Drains the wait queue in FIFO order, placing every job that now fits.
    pub fn drain_wait_queue(&mut self, now: f64) -> Vec<JobId> {
        let mut started = Vec::new();
        let mut remaining = Vec::new();
        for job_id in std::mem::take(&mut self.wait_queue) {
            if self.try_place(job_id, now) {
                started.push(job_id);
            } else {
                remaining.push(job_id);
            }
        }
        self.wait_queue = remaining;
        started
    }

    pub fn submit(&mut self, owner_id: EntityId, length_mi: i64, requested_pe_count: u32, now: f64) -> (Option<JobId>, SubmitResult) {
        if requested_pe_count > self.characteristics.total_pe_count() {
            return (None, SubmitResult::CantSupport);
        }

        let job_id = self.jobs.insert_with_key(|job_id| {
            let job = Job::new(job_id, owner_id, length_mi, requested_pe_count, now);
            ResidentJob::new(job, now)
        });

        if self.try_place(job_id, now) {
            (Some(job_id), SubmitResult::Accepted { job_id, started: true })
        } else {
            if let Some(rj) = self.jobs.get_mut(job_id) {
                rj.job.status = JobStatus::Queued;
            }
            self.wait_queue.push(job_id);
            (Some(job_id), SubmitResult::Accepted { job_id, started: false })
        }
    }

    /// Admits a job whose capacity was already carved out by an advance reservation:
    /// mints the job and attempts to place it immediately, falling back to the wait
    /// queue only if the physical PEs are not actually free yet (e.g. a straggling job
    /// from before the reservation window has not released them).
    pub fn admit_reserved(&mut self, owner_id: EntityId, length_mi: i64, requested_pe_count: u32, now: f64) -> JobId {
        let job_id = self.jobs.insert_with_key(|job_id| {
            let job = Job::new(job_id, owner_id, length_mi, requested_pe_count, now);
            ResidentJob::new(job, now)
        });
        if !self.try_place(job_id, now) {
            if let Some(rj) = self.jobs.get_mut(job_id) {
                rj.job.status = JobStatus::Queued;
            }
            self.wait_queue.push(job_id);
        }
        job_id
    }

    /// Cancels a job, folding its accumulated progress up to `now` into
    /// `finished_so_far_mi` before marking it `CANCELED`. Per §4.5, the reply "always
    /// replies with either the cancelled Job (status CANCELED...) or, if not
    /// found/already finished, a synthetic Job with status FAILED ... so the sender
    /// can locate it" -- a job already in a terminal state, or one this resource has
    /// never heard of, is never re-finalised as CANCELED; instead a FAILED placeholder
    /// carrying the known resource parameters is returned.
    pub fn cancel(&mut self, job_id: JobId, now: f64) -> (CancelResult, Option<Job>) {
        let Some(rj) = self.jobs.get_mut(job_id) else {
            return (CancelResult::NotFound, Some(self.synthetic_failed_job(job_id, now)));
        };
        if rj.job.status.is_terminal() {
            let mut placeholder = rj.job.clone();
            placeholder.status = JobStatus::Failed;
            return (CancelResult::AlreadyFinished, Some(placeholder));
        }
        rj.end_segment(now);
        rj.job.status = JobStatus::Canceled;
        rj.job.finish_time = Some(now);
        let job = rj.job.clone();
        self.release_job_pes(job_id);
        self.wait_queue.retain(|&id| id != job_id);
        (CancelResult::Ok, Some(job))
    }

    /// Builds the FAILED placeholder `Job` returned when `cancel`/`move` targets a job
    /// id this resource has no record of, carrying this resource's cost parameters
    /// (the only "resource parameters" available for a job it never admitted).
    fn synthetic_failed_job(&self, job_id: JobId, now: f64) -> Job {
        let mut job = Job::new(job_id, EntityId::default(), 0, 0, now);
        job.status = JobStatus::Failed;
        job.finish_time = Some(now);
        job.cost_per_sec = self.characteristics.cost_per_sec;
        job
    }

    pub fn pause(&mut self, job_id: JobId, now: f64) -> PauseResult {
        let Some(rj) = self.jobs.get_mut(job_id) else {
            return PauseResult::NotFound;
        };
        if rj.job.status != JobStatus::InExec {
            return PauseResult::NotRunning;
        }
        rj.end_segment(now);
        rj.job.status = JobStatus::Paused;
        self.release_job_pes(job_id);
        PauseResult::Ok
    }

    pub fn resume(&mut self, job_id: JobId, now: f64) -> ResumeResult {
        let Some(rj) = self.jobs.get_mut(job_id) else {
            return ResumeResult::NotFound;
        };
        if rj.job.status != JobStatus::Paused {
            return ResumeResult::NotPaused;
        }
        rj.job.status = JobStatus::Resumed;
        if self.try_place(job_id, now) {
            if let Some(rj) = self.jobs.get_mut(job_id) {
                rj.job.status = JobStatus::InExec;
            }
            ResumeResult::Ok { requeued: false }
        } else {
            if let Some(rj) = self.jobs.get_mut(job_id) {
                rj.job.status = JobStatus::Queued;
            }
            self.wait_queue.push(job_id);
            ResumeResult::Ok { requeued: true }
        }
    }

    pub fn status(&self, job_id: JobId) -> Option<JobStatus> {
        self.jobs.get(job_id).map(|rj| rj.job.status)
    }

    /// A cross-resource move is modelled by the caller cancelling here; the resident
    /// record is removed on success and the finalised `Job` returned so the caller can
    /// resubmit it (via `submit`/`SubmitJob`) to the destination resource.
    pub fn move_out(&mut self, job_id: JobId, now: f64) -> (MoveResult, Option<Job>) {
        match self.cancel(job_id, now) {
            (CancelResult::Ok, job) => (MoveResult::Ok, job),
            (CancelResult::AlreadyFinished, job) => (MoveResult::AlreadyFinished, job),
            (CancelResult::NotFound, _) => (MoveResult::NotFound, None),
        }
    }

    /// Marks every non-terminal job running on the given machine as FAILED, per the
    /// failure injector's `setJobsFailed` propagation, and returns the finalised jobs
    /// for the caller to hand back to their owners. The resident record is kept (not
    /// removed) so a later `available-start` can offer the job back via
    /// [`Self::set_jobs_resumable`].
    pub fn set_jobs_failed(&mut self, machine_id: MachineId, now: f64) -> Vec<Job> {
        let affected: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|(_, rj)| rj.assigned_machine == Some(machine_id) && !rj.job.status.is_terminal())
            .map(|(id, _)| id)
            .collect();
        let mut finalized = Vec::with_capacity(affected.len());
        for job_id in affected {
            if let Some(rj) = self.jobs.get_mut(job_id) {
                rj.end_segment(now);
                rj.job.status = JobStatus::Failed;
                rj.job.finish_time = Some(now);
                finalized.push(rj.job.clone());
            }
            self.release_job_pes(job_id);
        }
        finalized
    }

    /// Offers every job failed on `machine_id` back into the wait queue (as `PAUSED`,
    /// awaiting an explicit `resume`) now that the machine has recovered. Returns
    /// `true` if at least one job was made resumable, per the original's
    /// best-effort/boolean-return contract.
    pub fn set_jobs_resumable(&mut self, machine_id: MachineId) -> bool {
        let affected: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|(_, rj)| rj.assigned_machine == Some(machine_id) && rj.job.status == JobStatus::Failed)
            .map(|(id, _)| id)
            .collect();
        for &job_id in &affected {
            if let Some(rj) = self.jobs.get_mut(job_id) {
                rj.job.status = JobStatus::Paused;
                rj.job.finish_time = None;
                rj.assigned_machine = None;
                rj.assigned_pe_count = 0;
            }
        }
        !affected.is_empty()
    }
}
