use rand::Rng;

use super::{airtime, Rate, RateSet};
use crate::RateOptions;

/// Fixed-point scale of success probabilities.
pub(crate) const PROB_SCALE: u32 = 18_000;
/// Rates above this probability are never sampled and get a limited budget.
const PROB_HIGH: u32 = PROB_SCALE * 95 / 100;
/// Rates below this probability get a limited sampling budget.
const PROB_LOW: u32 = PROB_SCALE / 10;
/// Payload size throughput estimates are computed for.
const REFERENCE_LEN: usize = 1200;

#[derive(Debug, Clone)]
pub(crate) struct RateStats {
    pub(crate) rate: Rate,
    /// Airtime of a reference frame at this rate.
    airtime: u32,
    attempts: u32,
    successes: u32,
    last_attempts: u32,
    last_successes: u32,
    pub(crate) hist_attempts: u64,
    pub(crate) hist_successes: u64,
    cur_prob: u32,
    pub(crate) prob: u32,
    /// Estimated throughput in kbps.
    pub(crate) throughput: u32,
    sample_limit: Option<u32>,
}

impl RateStats {
    fn new(rate: Rate, ht40: bool) -> Self {
        Self {
            rate,
            airtime: airtime::airtime(rate, REFERENCE_LEN, ht40).max(1),
            attempts: 0,
            successes: 0,
            last_attempts: 0,
            last_successes: 0,
            hist_attempts: 0,
            hist_successes: 0,
            cur_prob: 0,
            prob: 0,
            throughput: 0,
            sample_limit: None,
        }
    }

    fn update(&mut self, level: u32, budget: u32) {
        if self.attempts > 0 {
            self.cur_prob = (self.successes as u64 * PROB_SCALE as u64 / self.attempts as u64) as u32;
            self.prob = if self.hist_attempts == 0 {
                self.cur_prob
            } else {
                (self.cur_prob * (100 - level) + self.prob * level) / 100
            };
        }

        self.last_attempts = self.attempts;
        self.last_successes = self.successes;
        self.hist_attempts += self.attempts as u64;
        self.hist_successes += self.successes as u64;
        self.attempts = 0;
        self.successes = 0;

        let bits = (REFERENCE_LEN * 8) as u64;
        self.throughput =
            (self.prob as u64 * bits * 1000 / (self.airtime as u64 * PROB_SCALE as u64)) as u32;

        self.sample_limit =
            if self.prob > PROB_HIGH || self.prob < PROB_LOW { Some(budget) } else { None };
    }
}

/// Index of the rate with the greatest `key`, first one on ties.
fn best(
    rates: &[RateStats],
    skip: Option<usize>,
    key: impl Fn(&RateStats) -> (u32, u32),
) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, stats) in rates.iter().enumerate() {
        if Some(i) == skip {
            continue;
        }
        if best.map_or(true, |b| key(stats) > key(&rates[b])) {
            best = Some(i);
        }
    }
    best
}

/// Rate adaptation state of one remote address.
#[derive(Debug, Clone)]
pub(crate) struct RateRecord {
    pub(crate) rates: Vec<RateStats>,
    ht40: bool,
    pub(crate) max_tp: usize,
    pub(crate) max_tp2: usize,
    pub(crate) max_prob: usize,
    pub(crate) lowest: usize,
    pub(crate) packet_count: u64,
    pub(crate) sample_count: u64,
}

impl RateRecord {
    /// Builds a fresh record. Returns `None` without candidates.
    pub(crate) fn new(candidates: &[Rate], ht40: bool) -> Option<Self> {
        if candidates.is_empty() {
            return None;
        }
        let rates: Vec<_> = candidates.iter().map(|r| RateStats::new(*r, ht40)).collect();
        let lowest = rates
            .iter()
            .enumerate()
            .max_by_key(|(_, r)| r.airtime)
            .map(|(i, _)| i)
            .unwrap_or_default();
        Some(Self {
            rates,
            ht40,
            max_tp: lowest,
            max_tp2: lowest,
            max_prob: lowest,
            lowest,
            packet_count: 0,
            sample_count: 0,
        })
    }

    pub(crate) fn same_candidates(&self, candidates: &[Rate], ht40: bool) -> bool {
        self.ht40 == ht40
            && self.rates.len() == candidates.len()
            && self.rates.iter().zip(candidates).all(|(s, r)| s.rate == *r)
    }

    /// Folds the period's counters and re-derives the preferred rates.
    pub(crate) fn update(&mut self, options: &RateOptions) {
        for stats in &mut self.rates {
            stats.update(options.ewma_level, options.sample_budget);
        }

        let max_tp = best(&self.rates, None, |s| (s.throughput, s.prob)).unwrap_or(self.lowest);
        let max_tp2 = best(&self.rates, Some(max_tp), |s| (s.throughput, s.prob)).unwrap_or(max_tp);
        // among reliable rates prefer the fastest, otherwise the most reliable
        let max_prob = best(&self.rates, None, |s| {
            if s.prob >= PROB_HIGH {
                (1, s.throughput)
            } else {
                (0, s.prob)
            }
        })
        .unwrap_or(self.lowest);

        self.max_tp = max_tp;
        self.max_tp2 = max_tp2;
        self.max_prob = max_prob;
    }

    /// Picks the rates for the next frame.
    pub(crate) fn select(&mut self, options: &RateOptions, rng: &mut impl Rng) -> RateSet {
        self.packet_count += 1;

        let [primary, second, reliable, lowest] = options.retries;
        let mut set = RateSet::default();
        match self.sample(options, rng) {
            Some(idx) => {
                set.push(self.rates[idx].rate, 1);
                set.push(self.rates[self.max_tp].rate, primary);
                set.push(self.rates[self.max_prob].rate, reliable);
                set.push(self.rates[self.lowest].rate, lowest);
            }
            None => {
                set.push(self.rates[self.max_tp].rate, primary);
                set.push(self.rates[self.max_tp2].rate, second);
                set.push(self.rates[self.max_prob].rate, reliable);
                set.push(self.rates[self.lowest].rate, lowest);
            }
        }
        set
    }

    fn sample(&mut self, options: &RateOptions, rng: &mut impl Rng) -> Option<usize> {
        if self.rates.len() < 2 {
            return None;
        }
        let target = self.packet_count * options.lookaround as u64 / 100;
        if self.sample_count >= target {
            return None;
        }

        // uniform over every rate but the primary
        let mut idx = rng.gen_range(0..self.rates.len() - 1);
        if idx >= self.max_tp {
            idx += 1;
        }

        let stats = &mut self.rates[idx];
        if stats.prob > PROB_HIGH {
            return None;
        }
        match stats.sample_limit.as_mut() {
            Some(0) => return None,
            Some(budget) => *budget -= 1,
            None => {}
        }

        self.sample_count += 1;
        Some(idx)
    }

    /// Charges `attempts` to the rates of `set` in order, each up to its
    /// tries. A success is credited to the last rate tried.
    pub(crate) fn feedback(&mut self, set: &RateSet, attempts: u8, success: bool) {
        let mut remaining = attempts as u32;
        let mut last = None;
        for entry in set.iter() {
            if remaining == 0 {
                break;
            }
            let used = remaining.min(entry.tries.max(1) as u32);
            remaining -= used;
            if let Some(idx) = self.rates.iter().position(|s| s.rate == entry.rate) {
                self.rates[idx].attempts += used;
                last = Some(idx);
            }
        }
        if success {
            if let Some(idx) = last {
                self.rates[idx].successes += 1;
            }
        }
    }

    /// Airtime of a `len` byte frame at the current primary rate.
    pub(crate) fn airtime(&self, len: usize) -> u32 {
        airtime::airtime(self.rates[self.max_tp].rate, len, self.ht40)
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn one(rate: Rate) -> RateSet {
        let mut set = RateSet::default();
        set.push(rate, 1);
        set
    }

    #[test]
    fn untried_rates_carry_their_probability() {
        let mut record = RateRecord::new(&[Rate::legacy(12), Rate::legacy(24)], false).unwrap();
        let options = RateOptions::default();

        for _ in 0..10 {
            record.feedback(&one(Rate::legacy(12)), 1, true);
        }
        record.update(&options);
        assert_eq!(record.rates[0].prob, PROB_SCALE);

        // nothing sent this period
        record.update(&options);
        assert_eq!(record.rates[0].prob, PROB_SCALE);
        assert_eq!(record.rates[0].hist_attempts, 10);
    }

    #[test]
    fn probability_is_smoothed() {
        let mut record = RateRecord::new(&[Rate::legacy(12)], false).unwrap();
        let options = RateOptions::default();

        for _ in 0..4 {
            record.feedback(&one(Rate::legacy(12)), 1, true);
        }
        record.update(&options);
        assert_eq!(record.rates[0].prob, PROB_SCALE);

        for _ in 0..4 {
            record.feedback(&one(Rate::legacy(12)), 1, false);
        }
        record.update(&options);
        // 0 * 25% + 100% * 75%
        assert_eq!(record.rates[0].prob, PROB_SCALE * 3 / 4);
    }

    #[test]
    fn retries_are_spread_over_the_chain() {
        let rates = [Rate::legacy(12), Rate::legacy(24), Rate::legacy(48)];
        let mut record = RateRecord::new(&rates, false).unwrap();
        let mut set = RateSet::default();
        set.push(Rate::legacy(48), 2);
        set.push(Rate::legacy(24), 2);
        set.push(Rate::legacy(12), 2);

        record.feedback(&set, 3, true);
        assert_eq!(record.rates[2].attempts, 2);
        assert_eq!(record.rates[1].attempts, 1);
        assert_eq!(record.rates[1].successes, 1);
        assert_eq!(record.rates[0].attempts, 0);
    }

    #[test]
    fn reliable_rates_are_not_sampled() {
        let rates = [Rate::legacy(12), Rate::legacy(24)];
        let mut record = RateRecord::new(&rates, false).unwrap();
        let options = RateOptions::default().lookaround(100);
        for rate in rates {
            record.feedback(&one(rate), 1, true);
        }
        record.update(&options);
        assert_eq!(record.rates[record.max_tp].rate, Rate::legacy(24));

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let set = record.select(&options, &mut rng);
            assert_eq!(set.primary(), Some(Rate::legacy(24)));
        }
        assert_eq!(record.sample_count, 0);
    }

    /// Feeds `successes` out of ten single-try frames at `rate`.
    fn seed(record: &mut RateRecord, rate: Rate, successes: usize) {
        for i in 0..10 {
            record.feedback(&one(rate), 1, i < successes);
        }
    }

    #[test]
    fn out_of_band_rates_share_a_budget() {
        let (reliable, failing, usable, fastest) =
            (Rate::legacy(12), Rate::legacy(24), Rate::legacy(48), Rate::legacy(96));
        let mut record = RateRecord::new(&[reliable, failing, usable, fastest], false).unwrap();
        let options = RateOptions::default().lookaround(100);

        seed(&mut record, reliable, 10);
        seed(&mut record, failing, 0);
        seed(&mut record, usable, 5);
        seed(&mut record, fastest, 5);
        record.update(&options);
        assert_eq!(record.rates[record.max_tp].rate, fastest);
        assert!(record.rates[0].prob > PROB_HIGH);
        assert!(record.rates[1].prob < PROB_LOW);

        let mut rng = StdRng::seed_from_u64(11);
        let mut picks = |record: &mut RateRecord| {
            let mut count = [0u64; 4];
            for _ in 0..1000 {
                let set = record.select(&options, &mut rng);
                let primary = set.primary().unwrap();
                if primary != fastest {
                    let idx = record.rates.iter().position(|s| s.rate == primary).unwrap();
                    count[idx] += 1;
                }
            }
            count
        };

        let count = picks(&mut record);
        assert_eq!(count[0], 0, "rates above the band are never sampled");
        assert_eq!(count[1], options.sample_budget as u64);
        assert!(count[2] > 100, "in-band rates are sampled freely: {count:?}");
        assert_eq!(record.sample_count, count.iter().sum::<u64>());

        // the budget is refilled on every update
        record.update(&options);
        let count = picks(&mut record);
        assert_eq!(count[0], 0);
        assert_eq!(count[1], options.sample_budget as u64);
    }
}
