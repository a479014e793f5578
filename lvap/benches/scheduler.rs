use std::time::Duration;

use bytes::Bytes;
use criterion::{
    criterion_group, criterion_main, measurement::WallTime, BenchmarkGroup, BenchmarkId, Criterion,
    Throughput,
};
use pprof::criterion::Output;
use rand::Rng;

use lvap::{EtherAddress, Outbound, RuleKey, Scheduler, SchedulerOptions, TxFrame};

const N_FRAMES: usize = 10_000;
const MAX_FRAME: usize = 1500;

// Using jemalloc improves performance by ~10%
#[cfg(all(not(windows), not(target_env = "musl")))]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

struct DrrBenchmark {
    /// Frames tagged with a tenant index, folded onto the tenants of a run.
    frames: Vec<(usize, Outbound)>,
    tenants: Vec<usize>,
}

impl DrrBenchmark {
    fn new(tenants: Vec<usize>, neighbors: u8) -> Self {
        let max_tenants = tenants.iter().copied().max().unwrap_or(1);
        let mut rng = rand::thread_rng();
        let frames = (0..N_FRAMES)
            .map(|_| {
                let tenant = rng.gen_range(0..max_tenants);
                let ra = EtherAddress::new([2, 0, 0, 0, tenant as u8, rng.gen_range(0..neighbors)]);
                let len = rng.gen_range(64..=MAX_FRAME);
                let frame = TxFrame {
                    dst: ra,
                    src: EtherAddress::ZERO,
                    iface: 0,
                    dscp: 0,
                    payload: Bytes::from(vec![0u8; len]),
                };
                let ta = EtherAddress::new([0, 0x0d, 0xb9, 0, 1, tenant as u8]);
                (tenant, Outbound { ra, ta, frame })
            })
            .collect();
        Self { frames, tenants }
    }

    fn bench_drain(&self, mut group: BenchmarkGroup<'_, WallTime>) {
        for n_tenants in &self.tenants {
            group.throughput(Throughput::Elements(N_FRAMES as u64));
            group.bench_function(BenchmarkId::from_parameter(n_tenants), |b| {
                let ssids: Vec<_> = (0..*n_tenants).map(|t| format!("tenant-{t}")).collect();

                b.iter(|| {
                    let scheduler =
                        Scheduler::new(SchedulerOptions::default().queue_capacity(N_FRAMES));
                    for (tenant, ssid) in ssids.iter().enumerate() {
                        let quantum = 1500 * (tenant as u32 % 4 + 1);
                        scheduler.add_rule(RuleKey::new(ssid.as_str(), 0), quantum, false);
                    }
                    for (tenant, out) in &self.frames {
                        let _ = scheduler.enqueue(&ssids[tenant % ssids.len()], 0, out.clone());
                    }
                    while scheduler.dequeue(|out| out.frame.len() as u32).is_some() {}
                });
            });
        }

        group.finish();
    }
}

fn drr_drain(c: &mut Criterion) {
    let _ = tracing_subscriber::fmt::try_init();

    let bench = DrrBenchmark::new(vec![1, 4, 16, 64], 8);
    let mut group = c.benchmark_group("drr_drain");
    group.sample_size(10);
    bench.bench_drain(group);
}

criterion_group! {
    name = benches;
    config = Criterion::default().warm_up_time(Duration::from_secs(1)).with_profiler(pprof::criterion::PProfProfiler::new(100, Output::Flamegraph(None)));
    targets = drr_drain
}

// Runs the deficit round robin scheduler over a growing number of tenants.
criterion_main!(benches);
