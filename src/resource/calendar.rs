use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const HOURS_PER_DAY: usize = 24;
const SECONDS_PER_DAY: i64 = 86_400;
const SECONDS_PER_HOUR: i64 = 3_600;

/// Time-of-day / weekend / holiday background load a resource carries independently
/// of any simulated job, plus the deterministic RNG used to jitter it.
///
/// `weekday_load` and `holiday_load` are 24-slot vectors (one bucket per hour of day),
/// each value clamped to `[0, 0.95]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceCalendar {
    pub weekday_load: [f64; HOURS_PER_DAY],
    pub holiday_load: [f64; HOURS_PER_DAY],
    /// Day-of-year (0-based) values treated as holidays.
    pub holidays: HashSet<u32>,
    /// Day-of-week values (0 = Sunday .. 6 = Saturday) treated as weekend.
    pub weekend_days: HashSet<u8>,
    pub time_zone: i8,
    pub rng_seed: u64,
    #[serde(skip, default)]
    rng: Option<StdRng>,
}

impl ResourceCalendar {
    pub fn new(weekday_load: [f64; HOURS_PER_DAY], holiday_load: [f64; HOURS_PER_DAY], holidays: HashSet<u32>, weekend_days: HashSet<u8>, time_zone: i8, rng_seed: u64) -> Self {
        let clamp = |v: f64| v.clamp(0.0, 0.95);
        ResourceCalendar {
            weekday_load: weekday_load.map(clamp),
            holiday_load: holiday_load.map(clamp),
            holidays,
            weekend_days,
            time_zone,
            rng_seed,
            rng: Some(StdRng::seed_from_u64(rng_seed)),
        }
    }

    fn ensure_rng(&mut self) -> &mut StdRng {
        self.rng.get_or_insert_with(|| StdRng::seed_from_u64(self.rng_seed))
    }

    fn day_index(&self, sim_time_s: f64) -> (u32, u8, usize) {
        let local_secs = sim_time_s as i64 + i64::from(self.time_zone) * SECONDS_PER_HOUR;
        let day_of_year = ((local_secs.div_euclid(SECONDS_PER_DAY)) % 365).rem_euclid(365) as u32;
        // Epoch 0 is treated as a Thursday, matching Unix epoch day-of-week arithmetic.
        let day_of_week = (((local_secs.div_euclid(SECONDS_PER_DAY) + 4).rem_euclid(7)) as u8).min(6);
        let hour = (local_secs.rem_euclid(SECONDS_PER_DAY) / SECONDS_PER_HOUR) as usize;
        (day_of_year, day_of_week, hour)
    }

    /// Returns the base background-load bucket in effect at `sim_time_s`, with no jitter.
    pub fn background_load(&self, sim_time_s: f64) -> f64 {
        let (day_of_year, day_of_week, hour) = self.day_index(sim_time_s);
        if self.holidays.contains(&day_of_year) || self.weekend_days.contains(&day_of_week) {
            self.holiday_load[hour]
        } else {
            self.weekday_load[hour]
        }
    }

    /// Same as [`Self::background_load`] but perturbed by the calendar's deterministic
    /// RNG, so repeated calls at the same simulated instant in a fresh run reproduce the
    /// same sequence of values as long as the seed is unchanged.
    pub fn background_load_jittered(&mut self, sim_time_s: f64) -> f64 {
        let base = self.background_load(sim_time_s);
        let jitter: f64 = self.ensure_rng().random_range(-0.02..=0.02);
        (base + jitter).clamp(0.0, 0.95)
    }
}
