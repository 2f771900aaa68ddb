use crate::job::gridlet::Job;
use crate::policy::ar::timeline::ReservationId;
use crate::resource::machine::MachineId;

/// Wraps a [`Job`] with the bookkeeping a resource needs while the job lives on it:
/// arrival/exec-start timestamps, the pause/resume accounting, and the assignment of
/// machine/PEs (and, for AR-admitted jobs, the owning reservation).
#[derive(Debug, Clone)]
pub struct ResidentJob {
    pub job: Job,
    pub arrival_time: f64,
    pub first_exec_start_time: Option<f64>,
    pub latest_exec_start_time: Option<f64>,
    /// Sum of `resume_segment_end - resume_segment_begin` across every run segment,
    /// i.e. actual CPU time consumed excluding time spent PAUSED.
    pub accumulated_completion_time: f64,
    /// Set while the current run segment is active (`INEXEC`); cleared on pause/finish.
    pub current_segment_start: Option<f64>,
    /// Aggregate MI/s the job was making progress at during the current segment
    /// (`mips_rating * assigned_pe_count`, captured at `begin_segment` so a later PE
    /// reassignment never retroactively changes how much of an already-run segment
    /// counted).
    pub current_segment_rate_mi_per_sec: f64,
    pub assigned_machine: Option<MachineId>,
    pub assigned_pe_count: u32,
    pub reservation_id: Option<ReservationId>,
}

impl ResidentJob {
    pub fn new(job: Job, arrival_time: f64) -> Self {
        ResidentJob {
            job,
            arrival_time,
            first_exec_start_time: None,
            latest_exec_start_time: None,
            accumulated_completion_time: 0.0,
            current_segment_start: None,
            current_segment_rate_mi_per_sec: 0.0,
            assigned_machine: None,
            assigned_pe_count: 0,
            reservation_id: None,
        }
    }

    /// Marks the beginning of a run segment, preserving `first_exec_start_time` across
    /// pause/resume cycles as required by the scheduler invariants. `rate_mi_per_sec`
    /// is the aggregate MI/s this segment executes at (`mips_rating * assigned PEs`).
    pub fn begin_segment(&mut self, now: f64, rate_mi_per_sec: f64) {
        if self.first_exec_start_time.is_none() {
            self.first_exec_start_time = Some(now);
        }
        self.latest_exec_start_time = Some(now);
        self.current_segment_start = Some(now);
        self.current_segment_rate_mi_per_sec = rate_mi_per_sec;
    }

    /// Closes the current run segment, folding its elapsed wall-clock time into the
    /// accumulated completion time and its elapsed MI (at the segment's captured rate)
    /// into `finished_so_far_mi`. Safe to call even if no segment is open.
    pub fn end_segment(&mut self, now: f64) {
        if let Some(start) = self.current_segment_start.take() {
            let elapsed = (now - start).max(0.0);
            self.accumulated_completion_time += elapsed;
            let done_mi = (elapsed * self.current_segment_rate_mi_per_sec).round() as i64;
            self.job.finished_so_far_mi = (self.job.finished_so_far_mi + done_mi).min(self.job.length_mi);
            self.current_segment_rate_mi_per_sec = 0.0;
        }
    }

    /// Wall-clock seconds still needed, at the current segment's rate, to finish the
    /// job's remaining MI. `None` if no segment is currently open.
    pub fn remaining_segment_duration(&self) -> Option<f64> {
        if self.current_segment_start.is_none() || self.current_segment_rate_mi_per_sec <= 0.0 {
            return None;
        }
        Some(self.job.remaining_mi() as f64 / self.current_segment_rate_mi_per_sec)
    }

    pub fn actual_cpu_time(&self) -> f64 {
        self.accumulated_completion_time
    }
}
