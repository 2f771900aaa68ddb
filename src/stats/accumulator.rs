/// Running statistics over a stream of `f64` samples: count, mean, mean-of-squares,
/// min, max, and the last value seen.
///
/// Invariants: `min <= mean <= max` whenever `count > 0`; `variance = sqr_mean - mean^2`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Accumulator {
    count: u64,
    mean: f64,
    sqr_mean: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl Default for Accumulator {
    fn default() -> Self {
        Accumulator { count: 0, mean: 0.0, sqr_mean: 0.0, min: f64::INFINITY, max: f64::NEG_INFINITY, last: 0.0 }
    }
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a single sample into the running statistics.
    pub fn add(&mut self, value: f64) {
        self.add_batch(value, 1);
    }

    /// Folds `k` repetitions of the same value `v` into the running statistics in one
    /// step, per the batch update formula:
    /// `n' = n + k; mean' = (n*mean + k*v)/n'; sqr_mean' = (n*sqr_mean + k*v^2)/n'`.
    pub fn add_batch(&mut self, value: f64, k: u64) {
        if k == 0 {
            return;
        }
        let n = self.count as f64;
        let kf = k as f64;
        let new_count = self.count + k;
        let new_n = new_count as f64;

        self.mean = (n * self.mean + kf * value) / new_n;
        self.sqr_mean = (n * self.sqr_mean + kf * value * value) / new_n;
        self.count = new_count;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.last = value;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn sum(&self) -> f64 {
        self.mean * self.count as f64
    }

    pub fn min(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.min }
    }

    pub fn max(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.max }
    }

    pub fn last(&self) -> f64 {
        self.last
    }

    /// `variance = sqr_mean - mean^2`, clamped to zero to absorb floating-point noise.
    pub fn variance(&self) -> f64 {
        (self.sqr_mean - self.mean * self.mean).max(0.0)
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_direct_computation() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let mut acc = Accumulator::new();
        for &v in &values {
            acc.add(v);
        }

        let n = values.len() as f64;
        let expected_mean = values.iter().sum::<f64>() / n;
        let expected_var = values.iter().map(|v| (v - expected_mean).powi(2)).sum::<f64>() / n;

        assert_eq!(acc.count(), values.len() as u64);
        assert!((acc.mean() - expected_mean).abs() < 1e-9);
        assert!((acc.variance() - expected_var).abs() < 1e-9);
        assert_eq!(acc.min(), 2.0);
        assert_eq!(acc.max(), 9.0);
        assert_eq!(acc.last(), 9.0);
    }

    #[test]
    fn batch_matches_repeated_single_adds() {
        let mut batched = Accumulator::new();
        batched.add_batch(3.0, 4);

        let mut single = Accumulator::new();
        for _ in 0..4 {
            single.add(3.0);
        }

        assert_eq!(batched.count(), single.count());
        assert!((batched.mean() - single.mean()).abs() < 1e-9);
        assert!((batched.variance() - single.variance()).abs() < 1e-9);
    }

    #[test]
    fn empty_accumulator_has_zeroed_bounds() {
        let acc = Accumulator::new();
        assert_eq!(acc.count(), 0);
        assert_eq!(acc.min(), 0.0);
        assert_eq!(acc.max(), 0.0);
    }
}
