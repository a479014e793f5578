//! Per-neighbor signal statistics.
//!
//! Frames are accumulated into the current window. A periodic sweep folds the
//! window into the moving averages and evicts neighbors that stayed silent for
//! too long. Readers only ever see folded values.

use lvap_common::{EtherAddress, Ewma, MovingAverage};
use lvap_wire::CqmEntry;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::frame::RxFrame;

#[derive(Debug, Clone, Copy, Default)]
struct Window {
    count: u32,
    sum: f64,
    sum_sq: f64,
}

impl Window {
    fn add(&mut self, sample: f64) {
        self.count = self.count.saturating_add(1);
        self.sum += sample;
        self.sum_sq += sample * sample;
    }

    /// Mean and standard deviation of the window.
    fn moments(&self) -> Option<(f64, f64)> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        let mean = self.sum / n;
        let var = (self.sum_sq / n - mean * mean).max(0.0);
        Some((mean, var.sqrt()))
    }
}

#[derive(Debug, Clone)]
struct LinkStats {
    window: Window,
    sma: MovingAverage,
    ewma: Ewma,
    last_avg: f64,
    last_std: f64,
    last_packets: u32,
    hist_packets: u64,
    silent_windows: u32,
}

impl LinkStats {
    fn new(sma_window: usize, ewma_weight: f64) -> Self {
        Self {
            window: Window::default(),
            sma: MovingAverage::new(sma_window),
            ewma: Ewma::new(ewma_weight),
            last_avg: 0.0,
            last_std: 0.0,
            last_packets: 0,
            hist_packets: 0,
            silent_windows: 0,
        }
    }

    fn fold(&mut self) {
        match self.window.moments() {
            Some((mean, std)) => {
                self.last_avg = mean;
                self.last_std = std;
                self.sma.update(mean);
                self.ewma.update(mean);
                self.silent_windows = 0;
            }
            None => self.silent_windows = self.silent_windows.saturating_add(1),
        }
        self.last_packets = self.window.count;
        self.hist_packets += self.window.count as u64;
        self.window = Window::default();
    }

    fn snapshot(&self) -> Option<LinkSnapshot> {
        if !self.ewma.is_initialized() {
            return None;
        }
        Some(LinkSnapshot {
            last_rssi_avg: clamp_i8(self.last_avg),
            last_rssi_std: self.last_std.round().clamp(0.0, u8::MAX as f64) as u8,
            ewma_rssi: clamp_i8(self.ewma.value()),
            sma_rssi: clamp_i8(self.sma.value().unwrap_or(self.last_avg)),
            last_packets: self.last_packets,
            hist_packets: self.hist_packets,
            silent_windows: self.silent_windows,
        })
    }
}

fn clamp_i8(value: f64) -> i8 {
    value.round().clamp(i8::MIN as f64, i8::MAX as f64) as i8
}

/// Folded statistics of one neighbor on one radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSnapshot {
    /// Mean RSSI of the last window, in dBm.
    pub last_rssi_avg: i8,
    /// Standard deviation of the RSSI in the last window.
    pub last_rssi_std: u8,
    /// Exponentially weighted RSSI.
    pub ewma_rssi: i8,
    /// Moving average of the window means.
    pub sma_rssi: i8,
    /// Frames heard in the last window.
    pub last_packets: u32,
    /// Frames heard since the entry was created.
    pub hist_packets: u64,
    /// Consecutive windows without a frame.
    pub silent_windows: u32,
}

impl LinkSnapshot {
    /// Channel-quality entry for `addr`.
    pub fn to_cqm(&self, addr: EtherAddress) -> CqmEntry {
        CqmEntry {
            addr,
            last_rssi_avg: self.last_rssi_avg,
            last_rssi_std: self.last_rssi_std,
            ewma_rssi: self.ewma_rssi,
            sma_rssi: self.sma_rssi,
            last_packets: self.last_packets,
            hist_packets: u32::try_from(self.hist_packets).unwrap_or(u32::MAX),
        }
    }
}

/// Link statistics for every neighbor heard on every radio.
#[derive(Debug)]
pub struct LinkStatsTracker {
    sma_window: usize,
    ewma_weight: f64,
    silent_limit: u32,
    links: RwLock<FxHashMap<(EtherAddress, usize), LinkStats>>,
    /// Channel busyness per interface: (current window, averaged value).
    busyness: RwLock<FxHashMap<usize, (Window, MovingAverage)>>,
}

impl LinkStatsTracker {
    /// Creates an empty tracker. Entries silent for `silent_limit` windows are evicted.
    pub fn new(sma_window: usize, ewma_weight: f64, silent_limit: u32) -> Self {
        Self {
            sma_window,
            ewma_weight,
            silent_limit,
            links: RwLock::default(),
            busyness: RwLock::default(),
        }
    }

    /// Accounts an observed frame to its transmitter.
    pub fn observe(&self, frame: &RxFrame) {
        let mut links = self.links.write();
        links
            .entry((frame.ta, frame.iface))
            .or_insert_with(|| LinkStats::new(self.sma_window, self.ewma_weight))
            .window
            .add(frame.rssi as f64);
    }

    /// Records a channel occupancy sample (e.g. percent of busy time) for a radio.
    pub fn record_busyness(&self, iface: usize, busy: u32) {
        self.busyness
            .write()
            .entry(iface)
            .or_insert_with(|| (Window::default(), MovingAverage::new(self.sma_window)))
            .0
            .add(busy as f64);
    }

    /// Folds every window and evicts neighbors silent for more than the
    /// configured number of windows. Returns the number of evictions.
    pub fn sweep(&self) -> usize {
        let mut links = self.links.write();
        let before = links.len();
        links.retain(|(addr, iface), stats| {
            stats.fold();
            let keep = stats.silent_windows <= self.silent_limit;
            if !keep {
                trace!(%addr, iface, "neighbor evicted");
            }
            keep
        });
        let evicted = before - links.len();
        drop(links);

        for (window, avg) in self.busyness.write().values_mut() {
            if let Some((mean, _)) = window.moments() {
                avg.update(mean);
            }
            *window = Window::default();
        }

        evicted
    }

    /// Latest folded statistics of `addr` on `iface`.
    pub fn get(&self, addr: EtherAddress, iface: usize) -> Option<LinkSnapshot> {
        self.links.read().get(&(addr, iface)).and_then(LinkStats::snapshot)
    }

    /// Whether `addr` is tracked on `iface`.
    pub fn contains(&self, addr: EtherAddress, iface: usize) -> bool {
        self.links.read().contains_key(&(addr, iface))
    }

    /// Smoothed RSSI of `addr` on the radio that hears it best, with that radio.
    pub fn rssi(&self, addr: EtherAddress) -> Option<(i8, usize)> {
        self.links
            .read()
            .iter()
            .filter(|((a, _), _)| *a == addr)
            .filter_map(|((_, iface), stats)| stats.snapshot().map(|s| (s, *iface)))
            .max_by_key(|(s, _)| s.hist_packets)
            .map(|(s, iface)| (s.ewma_rssi, iface))
    }

    /// Averaged channel busyness of a radio.
    pub fn busyness(&self, iface: usize) -> Option<u32> {
        self.busyness
            .read()
            .get(&iface)
            .and_then(|(_, avg)| avg.value())
            .map(|v| v.round().max(0.0) as u32)
    }

    /// Every neighbor heard on `iface` with folded statistics, ordered by address.
    pub fn neighbors(&self, iface: usize) -> Vec<(EtherAddress, LinkSnapshot)> {
        let mut neighbors: Vec<_> = self
            .links
            .read()
            .iter()
            .filter(|((_, i), _)| *i == iface)
            .filter_map(|((addr, _), stats)| stats.snapshot().map(|s| (*addr, s)))
            .collect();
        neighbors.sort_unstable_by_key(|(addr, _)| *addr);
        neighbors
    }

    /// Number of tracked (neighbor, radio) pairs.
    pub fn len(&self) -> usize {
        self.links.read().len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.links.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STA: EtherAddress = EtherAddress::new([2, 0, 0, 0, 0, 1]);

    fn frame(rssi: i8, iface: usize) -> RxFrame {
        RxFrame { ta: STA, iface, rssi, length: 100, ..Default::default() }
    }

    #[test]
    fn readers_only_see_folded_values() {
        let tracker = LinkStatsTracker::new(4, 0.5, 3);
        tracker.observe(&frame(-60, 0));
        assert!(tracker.get(STA, 0).is_none());
        assert!(tracker.rssi(STA).is_none());

        tracker.sweep();
        tracker.observe(&frame(-20, 0));
        let snapshot = tracker.get(STA, 0).unwrap();
        assert_eq!(snapshot.ewma_rssi, -60);
        assert_eq!(snapshot.last_packets, 1);
    }

    #[test]
    fn window_moments() {
        let tracker = LinkStatsTracker::new(4, 0.5, 3);
        for rssi in [-50, -70, -50, -70] {
            tracker.observe(&frame(rssi, 0));
        }
        tracker.sweep();
        let snapshot = tracker.get(STA, 0).unwrap();
        assert_eq!(snapshot.last_rssi_avg, -60);
        assert_eq!(snapshot.last_rssi_std, 10);
        assert_eq!(snapshot.hist_packets, 4);

        for rssi in [-40, -40] {
            tracker.observe(&frame(rssi, 0));
        }
        tracker.sweep();
        let snapshot = tracker.get(STA, 0).unwrap();
        assert_eq!(snapshot.ewma_rssi, -50);
        assert_eq!(snapshot.sma_rssi, -50);
        assert_eq!(snapshot.hist_packets, 6);
    }

    #[test]
    fn best_radio_wins() {
        let tracker = LinkStatsTracker::new(4, 0.5, 3);
        tracker.observe(&frame(-80, 0));
        for _ in 0..5 {
            tracker.observe(&frame(-55, 1));
        }
        tracker.sweep();
        assert_eq!(tracker.rssi(STA), Some((-55, 1)));
        assert_eq!(tracker.neighbors(0).len(), 1);
    }

    #[test]
    fn busyness_is_averaged() {
        let tracker = LinkStatsTracker::new(2, 0.5, 3);
        tracker.record_busyness(0, 10);
        tracker.record_busyness(0, 30);
        assert_eq!(tracker.busyness(0), None);

        tracker.sweep();
        assert_eq!(tracker.busyness(0), Some(20));

        tracker.record_busyness(0, 40);
        tracker.sweep();
        assert_eq!(tracker.busyness(0), Some(30));
        // silent windows do not drag the average down
        tracker.sweep();
        assert_eq!(tracker.busyness(0), Some(30));
    }
}
