use lvap_agent::{Rate, RateController, RateSet, TxStatus};
use lvap_wire::{Message, SetPort};

use crate::helpers::*;

fn status(rate: Rate, attempts: u8, success: bool) -> TxStatus {
    let mut rates = RateSet::default();
    rates.push(rate, attempts);
    TxStatus { dst: sta(1), iface: 0, rates, attempts, success }
}

#[test]
fn lookaround_share_of_packets_is_sampled() {
    let _ = tracing_subscriber::fmt::try_init();

    let rates = [12, 24, 48, 96].map(Rate::legacy);
    let controller = RateController::new(lvap_agent::RateOptions::default().lookaround(20));
    assert!(controller.rebuild(sta(1), &rates, false));

    // every rate gets through every other attempt
    for rate in rates {
        for _ in 0..50 {
            controller.feedback(&status(rate, 2, true));
        }
    }
    controller.update();

    let snapshot = controller.snapshot(sta(1)).unwrap();
    assert!(snapshot.rates.iter().all(|r| (r.probability - 0.5).abs() < 1e-9));

    const PACKETS: usize = 10_000;
    let best = snapshot.best_throughput;
    let sampled = (0..PACKETS)
        .filter(|_| controller.select(sta(1)).unwrap().primary() != Some(best))
        .count();

    let share = sampled as f64 / PACKETS as f64;
    assert!((share - 0.20).abs() <= 0.01, "sampled {share}");
    assert_eq!(controller.snapshot(sta(1)).unwrap().samples, sampled as u64);
}

#[test]
fn port_restricts_candidate_rates() {
    let mut fixture = Fixture::new(options());
    let agent = &fixture.agent;
    agent.handle(add_station(station(1, "lab"))).unwrap();
    assert!(agent.rates().contains(sta(1)));

    agent
        .handle(Message::SetPort(SetPort {
            sta: sta(1),
            rsrc: rsrc(),
            mcs: vec![24, 12],
            ..Default::default()
        }))
        .unwrap();

    let rates: Vec<_> =
        agent.rates().snapshot(sta(1)).unwrap().rates.into_iter().map(|r| r.rate).collect();
    assert_eq!(rates, vec![Rate::legacy(12), Rate::legacy(24)]);

    let set = agent.rates().select(sta(1)).unwrap();
    assert!(set.iter().all(|e| rates.contains(&e.rate)));

    assert!(fixture.sent().iter().any(|m| matches!(m, Message::PortStatus(p) if p.port.sta == sta(1))));
}

#[test]
fn feedback_moves_best_rate() {
    let fixture = Fixture::new(options());
    let agent = &fixture.agent;
    agent.handle(add_station(station(1, "lab"))).unwrap();
    agent
        .handle(Message::SetPort(SetPort {
            sta: sta(1),
            rsrc: rsrc(),
            mcs: vec![12, 108],
            ..Default::default()
        }))
        .unwrap();

    for _ in 0..3 {
        for i in 0..100 {
            agent.tx_status(&status(Rate::legacy(12), 1, true));
            agent.tx_status(&status(Rate::legacy(108), 1, i % 2 == 0));
        }
        agent.update_rates();
    }

    // half of 54M still beats all of 6M
    let snapshot = agent.rates().snapshot(sta(1)).unwrap();
    assert_eq!(snapshot.best_throughput, Rate::legacy(108));
    assert_eq!(snapshot.lowest, Rate::legacy(12));

    let scheduled = {
        agent.transmit(lvap_agent::TxFrame {
            dst: sta(1),
            src: WTP,
            iface: 0,
            dscp: 0,
            payload: bytes::Bytes::from_static(&[0u8; 100]),
        });
        agent.next_frame().unwrap()
    };
    assert!(scheduled.rates.iter().any(|e| e.rate == Rate::legacy(12)));
}
