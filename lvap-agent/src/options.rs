use std::{net::SocketAddr, time::Duration};

use lvap_common::EtherAddress;
use lvap_wire::{NetworkPort, ResourceElement};

const DEFAULT_OUTBOUND_BUFFER: usize = 1024;

/// Options for an [`Agent`](crate::Agent) and its controller connection.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Address of this access point (the WTP), stamped on every report.
    pub wtp: EtherAddress,
    /// Controller endpoint.
    pub controller: SocketAddr,
    /// Radio inventory. The index of an element is its interface number.
    pub resources: Vec<ResourceElement>,
    /// Named network ports advertised in the capability report.
    pub ports: Vec<NetworkPort>,
    /// Nominal keep-alive period.
    pub hello_period: Duration,
    /// Relative jitter applied to every keep-alive, `0.1` meaning ±10%.
    pub hello_jitter: f64,
    /// How often the link-stats window is folded into the averages.
    pub sweep_period: Duration,
    /// Consecutive silent windows after which a link-stats entry is evicted.
    pub silent_windows: u32,
    /// Window of the short moving average of RSSI.
    pub sma_window: usize,
    /// Weight of the newest window in the RSSI EWMA.
    pub ewma_weight: f64,
    /// Capacity of the outbound message buffer. Messages are dropped when full.
    pub outbound_buffer: usize,
    /// Frame records a summary trigger buffers per period.
    pub summary_capacity: usize,
    /// Initial reconnect backoff, doubled on every failed attempt.
    pub backoff_duration: Duration,
    /// Upper bound of the reconnect backoff.
    pub max_backoff: Duration,
    /// Rate controller tuning.
    pub rate: RateOptions,
    /// Scheduler tuning.
    pub scheduler: SchedulerOptions,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            wtp: EtherAddress::ZERO,
            controller: SocketAddr::from(([127, 0, 0, 1], 4433)),
            resources: Vec::new(),
            ports: Vec::new(),
            hello_period: Duration::from_secs(5),
            hello_jitter: 0.1,
            sweep_period: Duration::from_secs(1),
            silent_windows: 10,
            sma_window: 10,
            ewma_weight: 0.25,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            summary_capacity: 256,
            backoff_duration: Duration::from_millis(200),
            max_backoff: Duration::from_secs(30),
            rate: RateOptions::default(),
            scheduler: SchedulerOptions::default(),
        }
    }
}

impl AgentOptions {
    /// Sets the address of this access point.
    pub fn wtp(mut self, wtp: EtherAddress) -> Self {
        self.wtp = wtp;
        self
    }

    /// Sets the controller endpoint.
    pub fn controller(mut self, controller: SocketAddr) -> Self {
        self.controller = controller;
        self
    }

    /// Adds a radio. Interfaces are numbered in the order they are added.
    pub fn resource(mut self, rsrc: ResourceElement) -> Self {
        self.resources.push(rsrc);
        self
    }

    /// Adds a named network port to the capability report.
    pub fn port(mut self, port: NetworkPort) -> Self {
        self.ports.push(port);
        self
    }

    /// Sets the keep-alive period.
    pub fn hello_period(mut self, period: Duration) -> Self {
        self.hello_period = period;
        self
    }

    /// Sets the keep-alive jitter. Clamped to `[0.0, 0.5]`.
    pub fn hello_jitter(mut self, jitter: f64) -> Self {
        self.hello_jitter = jitter.clamp(0.0, 0.5);
        self
    }

    /// Sets the link-stats sweep period.
    pub fn sweep_period(mut self, period: Duration) -> Self {
        self.sweep_period = period;
        self
    }

    /// Sets the number of silent windows after which a neighbor is forgotten.
    pub fn silent_windows(mut self, windows: u32) -> Self {
        self.silent_windows = windows;
        self
    }

    /// Sets the RSSI moving average window and EWMA weight.
    pub fn smoothing(mut self, sma_window: usize, ewma_weight: f64) -> Self {
        self.sma_window = sma_window;
        self.ewma_weight = ewma_weight;
        self
    }

    /// Sets the outbound message buffer size.
    pub fn outbound_buffer(mut self, size: usize) -> Self {
        self.outbound_buffer = size;
        self
    }

    /// Sets how many frame records a summary trigger buffers per period.
    pub fn summary_capacity(mut self, capacity: usize) -> Self {
        self.summary_capacity = capacity;
        self
    }

    /// Sets the initial and maximum reconnect backoff.
    pub fn backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.backoff_duration = initial;
        self.max_backoff = max;
        self
    }

    /// Sets the rate controller tuning.
    pub fn rate(mut self, rate: RateOptions) -> Self {
        self.rate = rate;
        self
    }

    /// Sets the scheduler tuning.
    pub fn scheduler(mut self, scheduler: SchedulerOptions) -> Self {
        self.scheduler = scheduler;
        self
    }
}

/// Rate controller tuning.
#[derive(Debug, Clone)]
pub struct RateOptions {
    /// Statistics are recomputed once per period.
    pub period: Duration,
    /// Weight (percent) of the previous smoothed probability.
    pub ewma_level: u32,
    /// Share of packets (percent) spent sampling other rates.
    pub lookaround: u32,
    /// Forced samples per period for rates outside the 10%..95% band.
    pub sample_budget: u32,
    /// Tries for the primary, second, most-reliable and lowest rate.
    pub retries: [u8; 4],
}

impl Default for RateOptions {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(500),
            ewma_level: 75,
            lookaround: 10,
            sample_budget: 4,
            retries: [4, 3, 2, 2],
        }
    }
}

impl RateOptions {
    /// Sets the statistics recompute period.
    pub fn period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Sets the EWMA level. Clamped to `0..=100`.
    pub fn ewma_level(mut self, level: u32) -> Self {
        self.ewma_level = level.min(100);
        self
    }

    /// Sets the sampling share. Clamped to `0..=100`.
    pub fn lookaround(mut self, percent: u32) -> Self {
        self.lookaround = percent.min(100);
        self
    }

    /// Sets the forced samples per period for rates outside the 10%..95% band.
    pub fn sample_budget(mut self, budget: u32) -> Self {
        self.sample_budget = budget;
        self
    }

    /// Sets the tries of the primary, second, most-reliable and lowest rate.
    pub fn retries(mut self, retries: [u8; 4]) -> Self {
        self.retries = retries;
        self
    }
}

/// Traffic scheduler tuning.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Quantum (airtime microseconds) of rules created on demand.
    pub default_quantum: u32,
    /// Capacity of every per-neighbor sub-queue.
    pub queue_capacity: usize,
    /// Empty pulls tolerated before the scheduler parks.
    pub max_empty_pulls: u32,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self { default_quantum: 12_000, queue_capacity: 1024, max_empty_pulls: 8 }
    }
}

impl SchedulerOptions {
    /// Sets the quantum of rules created on demand. At least 1.
    pub fn default_quantum(mut self, quantum: u32) -> Self {
        self.default_quantum = quantum.max(1);
        self
    }

    /// Sets the capacity of every sub-queue. At least 1.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Sets the empty pulls tolerated before the scheduler parks.
    pub fn max_empty_pulls(mut self, pulls: u32) -> Self {
        self.max_empty_pulls = pulls;
        self
    }
}
