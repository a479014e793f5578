use std::time::Duration;

use lvap_agent::{AddOutcome, RxFrame, Trigger};
use lvap_common::EtherAddress;
use lvap_wire::{
    AddBusynessTrigger, AddRssiTrigger, AddSummaryTrigger, DelTrigger, Message, Relation,
};

use crate::helpers::*;

fn heard(ta: EtherAddress, rssi: i8) -> RxFrame {
    RxFrame { ta, ra: RADIO, iface: 0, rssi, length: 100, ..Default::default() }
}

fn rssi_trigger(id: u32, value: i8) -> Message {
    Message::AddRssiTrigger(AddRssiTrigger {
        id,
        sta: sta(1),
        relation: Relation::Gt,
        value,
        period_ms: 100,
    })
}

fn rssi_reports(sent: &[Message]) -> Vec<(u32, i8)> {
    sent.iter()
        .filter_map(|m| match m {
            Message::RssiTrigger(r) => Some((r.id, r.current)),
            _ => None,
        })
        .collect()
}

#[test]
fn rssi_trigger_reports_once_per_crossing() {
    let _ = tracing_subscriber::fmt::try_init();

    // the averages follow the last window exactly
    let mut fixture = Fixture::new(options().smoothing(1, 1.0));
    fixture.agent.handle(rssi_trigger(7, -70)).unwrap();

    for rssi in [-75, -75, -60, -60, -80] {
        fixture.agent.receive(&heard(sta(1), rssi));
        fixture.agent.sweep();
        fixture.agent.evaluate_trigger(7);
    }

    assert_eq!(rssi_reports(&fixture.sent()), vec![(7, -60)]);
    assert!(!fixture.agent.triggers().get(7).unwrap().dispatched);

    // crossing again reports again
    fixture.agent.receive(&heard(sta(1), -50));
    fixture.agent.sweep();
    fixture.agent.evaluate_trigger(7);
    assert_eq!(rssi_reports(&fixture.sent()), vec![(7, -50)]);
}

#[test]
fn same_condition_rearms_existing_trigger() {
    let fixture = Fixture::new(options());
    let agent = &fixture.agent;
    let period = Duration::from_secs(1);

    assert_eq!(agent.add_trigger(Trigger::rssi(1, sta(1), Relation::Gt, -70, period)), AddOutcome::Created);
    assert_eq!(agent.add_trigger(Trigger::rssi(2, sta(1), Relation::Gt, -70, period)), AddOutcome::Rearmed(1));
    assert_eq!(agent.add_trigger(Trigger::rssi(1, sta(1), Relation::Lt, -80, period)), AddOutcome::Rearmed(1));
    assert_eq!(agent.triggers().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn timer_evaluates_until_deleted() {
    let mut fixture = Fixture::new(options().smoothing(1, 1.0));
    fixture.agent.handle(rssi_trigger(3, -70)).unwrap();
    assert_eq!(fixture.agent.triggers().timers(), 1);

    fixture.agent.receive(&heard(sta(1), -40));
    fixture.agent.sweep();

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(rssi_reports(&fixture.sent()), vec![(3, -40)]);

    fixture.agent.handle(Message::DelRssiTrigger(DelTrigger { id: 3 })).unwrap();
    assert_eq!(fixture.agent.triggers().timers(), 0);
    assert!(fixture.agent.triggers().is_empty());

    let err = fixture.agent.handle(Message::DelRssiTrigger(DelTrigger { id: 3 }));
    assert!(err.is_err());
    assert_eq!(fixture.agent.stats().unknown_entities(), 1);
}

#[test]
fn busyness_trigger_reports_on_threshold() {
    let mut fixture = Fixture::new(options().smoothing(1, 1.0));
    let agent = &fixture.agent;
    agent
        .handle(Message::AddBusynessTrigger(AddBusynessTrigger {
            id: 11,
            rsrc: rsrc(),
            relation: Relation::Ge,
            value: 50,
            period_ms: 500,
        }))
        .unwrap();

    // no sample yet
    agent.evaluate_trigger(11);

    agent.record_busyness(0, 30);
    agent.sweep();
    agent.evaluate_trigger(11);

    agent.record_busyness(0, 80);
    agent.sweep();
    agent.evaluate_trigger(11);

    let reports: Vec<_> = fixture
        .sent()
        .into_iter()
        .filter_map(|m| match m {
            Message::BusynessTrigger(r) => Some((r.id, r.rsrc, r.current)),
            _ => None,
        })
        .collect();
    assert_eq!(reports, vec![(11, rsrc(), 80)]);
}

#[test]
fn summary_trigger_expires_after_its_limit() {
    let mut fixture = Fixture::new(options());
    let agent = &fixture.agent;
    agent
        .handle(Message::AddSummaryTrigger(AddSummaryTrigger {
            id: 20,
            addr: EtherAddress::BROADCAST,
            rsrc: rsrc(),
            limit: 2,
            period_ms: 1000,
        }))
        .unwrap();

    for last in 1..=3 {
        agent.receive(&heard(sta(last), -50));
    }
    agent.evaluate_trigger(20);
    // nothing heard in between
    agent.evaluate_trigger(20);
    agent.receive(&heard(sta(4), -50));
    agent.evaluate_trigger(20);

    assert!(agent.triggers().get(20).is_none());

    let summaries: Vec<_> = fixture
        .sent()
        .into_iter()
        .filter_map(|m| match m {
            Message::Summary(s) => Some(s.frames.iter().map(|f| f.ta).collect::<Vec<_>>()),
            _ => None,
        })
        .collect();
    assert_eq!(summaries, vec![vec![sta(1), sta(2), sta(3)], vec![sta(4)]]);
}

#[test]
fn summary_on_one_station_ignores_others() {
    let mut fixture = Fixture::new(options());
    let agent = &fixture.agent;
    agent
        .handle(Message::AddSummaryTrigger(AddSummaryTrigger {
            id: 21,
            addr: sta(2),
            rsrc: rsrc(),
            limit: -1,
            period_ms: 1000,
        }))
        .unwrap();

    agent.receive(&heard(sta(1), -50));
    agent.receive(&heard(sta(2), -50));
    agent.evaluate_trigger(21);
    assert!(agent.triggers().get(21).is_some());

    let frames: usize = fixture
        .sent()
        .iter()
        .map(|m| match m {
            Message::Summary(s) => s.frames.len(),
            _ => 0,
        })
        .sum();
    assert_eq!(frames, 1);
}

#[test]
fn silent_neighbors_are_evicted() {
    let fixture = Fixture::new(options().silent_windows(2));
    let agent = &fixture.agent;

    agent.receive(&heard(sta(1), -50));
    for _ in 0..3 {
        assert_eq!(agent.sweep(), 0);
        assert!(agent.link_stats().contains(sta(1), 0));
    }
    assert_eq!(agent.sweep(), 1);
    assert!(!agent.link_stats().contains(sta(1), 0));
}
