use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use lvap_agent::{Admission, Outbound, RuleKey, Scheduler, SchedulerOptions, TxFrame};
use lvap_common::EtherAddress;

use crate::helpers::*;

fn outbound(ra: EtherAddress, len: usize) -> Outbound {
    let frame = TxFrame {
        dst: ra,
        src: WTP,
        iface: 0,
        dscp: 0,
        payload: Bytes::from(vec![0u8; len]),
    };
    Outbound { ra, ta: RADIO, frame }
}

#[test]
fn drr_serves_bytes_in_quantum_ratio() {
    let _ = tracing_subscriber::fmt::try_init();

    const MAX_PACKET: u64 = 1500;
    let scheduler = Scheduler::new(SchedulerOptions::default().queue_capacity(64));
    scheduler.add_rule(RuleKey::new("gold", 0), 3000, false);
    scheduler.add_rule(RuleKey::new("silver", 0), 1500, false);

    let sizes = [[300, 700, 1500, 90], [500, 1200, 100, 1400]];
    let tenants = ["gold", "silver"];
    let mut next = [0usize; 2];

    let mut push = |tenant: usize| {
        let len = sizes[tenant][next[tenant] % 4];
        next[tenant] += 1;
        scheduler.enqueue(tenants[tenant], 0, outbound(sta(tenant as u8), len)).unwrap();
    };
    // keep both rules backlogged for the whole run
    for _ in 0..32 {
        push(0);
        push(1);
    }

    let mut served = [0u64; 2];
    for _ in 0..20_000 {
        let out = scheduler.dequeue(|out| out.frame.len() as u32).unwrap();
        let tenant = if out.ra == sta(0) { 0 } else { 1 };
        served[tenant] += out.frame.len() as u64;
        push(tenant);
    }

    let [gold, silver] = served;
    let ratio = gold as f64 / silver as f64;
    assert!((ratio - 2.0).abs() < 0.05, "ratio {ratio}");
    // one quantum of the larger rule plus a packet per rule per round
    assert!(gold.abs_diff(2 * silver) <= 3000 + 3 * MAX_PACKET, "{gold} vs {silver}");
}

#[test]
fn unknown_class_falls_back_to_tenant_default() {
    let scheduler = Scheduler::new(SchedulerOptions::default().default_quantum(5000));
    scheduler.enqueue("lab", 46, outbound(sta(1), 100)).unwrap();

    let rule = scheduler.rule(&RuleKey::new("lab", 0)).unwrap();
    assert_eq!(rule.quantum, 5000);
    assert_eq!(rule.queued, 1);
    assert!(scheduler.rule(&RuleKey::new("lab", 46)).is_none());
}

#[test]
fn full_sub_queue_drops() {
    let scheduler = Scheduler::new(SchedulerOptions::default().queue_capacity(2));
    scheduler.enqueue("lab", 0, outbound(sta(1), 100)).unwrap();
    scheduler.enqueue("lab", 0, outbound(sta(1), 100)).unwrap();
    assert!(scheduler.enqueue("lab", 0, outbound(sta(1), 100)).is_err());
    // another neighbor has its own sub-queue
    scheduler.enqueue("lab", 0, outbound(sta(2), 100)).unwrap();

    let rule = scheduler.rule(&RuleKey::new("lab", 0)).unwrap();
    assert_eq!(rule.dropped, 1);
    assert_eq!(rule.neighbors, 2);
}

#[tokio::test]
async fn parked_scheduler_wakes_on_enqueue() {
    let scheduler =
        Arc::new(Scheduler::new(SchedulerOptions::default().max_empty_pulls(2)));
    assert!(scheduler.dequeue(|_| 1).is_none());
    assert!(scheduler.dequeue(|_| 1).is_none());
    assert!(scheduler.is_parked());

    let waiter = tokio::spawn({
        let scheduler = Arc::clone(&scheduler);
        async move {
            scheduler.ready().await;
            scheduler.dequeue(|_| 0)
        }
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    scheduler.enqueue("lab", 0, outbound(sta(1), 100)).unwrap();

    let out = tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    assert!(out.is_some());
    assert!(!scheduler.is_parked());
}

#[test]
fn agent_releases_admitted_frames_with_rates() {
    let fixture = Fixture::new(options());
    let agent = &fixture.agent;
    let info = station(1, "lab");
    agent.handle(add_station(info.clone())).unwrap();

    let frame = |dst| TxFrame {
        dst,
        src: WTP,
        iface: 0,
        dscp: 0,
        payload: Bytes::from_static(&[0u8; 512]),
    };
    assert_eq!(agent.transmit(frame(sta(1))), 1);
    assert_eq!(agent.transmit(frame(sta(9))), 0);
    assert_eq!(agent.stats().refused(Admission::UnknownStation), 1);

    let scheduled = agent.next_frame().unwrap();
    assert_eq!(scheduled.out.ra, sta(1));
    assert_eq!(scheduled.out.ta, info.vbssid);
    assert!(scheduled.rates.primary().is_some());
    assert!(agent.next_frame().is_none());

    let (tx, _) = agent.registry().counters(sta(1)).unwrap();
    assert_eq!(tx.iter().map(|c| c.count).sum::<u32>(), 1);
    assert_eq!(agent.stats().bytes_tx(), 512);
}

#[test]
fn broadcast_reaches_every_bssid_once() {
    let fixture = Fixture::new(options());
    let agent = &fixture.agent;
    agent.handle(add_station(station(1, "lab"))).unwrap();
    agent.handle(add_station(station(2, "guest"))).unwrap();

    let queued = agent.transmit(TxFrame {
        dst: EtherAddress::BROADCAST,
        src: WTP,
        iface: 0,
        dscp: 0,
        payload: Bytes::from_static(b"arp"),
    });
    assert_eq!(queued, 2);

    let mut tenants = Vec::new();
    while let Some(scheduled) = agent.next_frame() {
        assert_eq!(scheduled.out.ra, EtherAddress::BROADCAST);
        // group frames are not retried
        assert_eq!(scheduled.rates.iter().map(|e| e.tries).sum::<u8>(), 1);
        tenants.push(scheduled.out.ta);
    }
    tenants.sort();
    assert_eq!(tenants, vec![station(1, "lab").vbssid, station(2, "guest").vbssid]);
}
