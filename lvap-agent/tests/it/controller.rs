use std::time::Duration;

use bytes::{BufMut, BytesMut};
use futures::{SinkExt, StreamExt};
use lvap_agent::{Agent, GroupTable};
use lvap_wire::{
    encode, AddTrafficRule, AddVap, Codec, CountersRequest, CqmRequest, DelStation, Message,
    MgmtResponse, MsgType, Packet, StationResponse, TrafficRule, HEADER_LEN, PROTOCOL_VERSION,
};
use tokio::net::TcpListener;
use tokio_util::codec::Framed;

use crate::helpers::*;

fn kinds(sent: &[Message]) -> Vec<MsgType> {
    sent.iter().map(Message::msg_type).collect()
}

#[test]
fn buffer_is_handled_in_order() {
    let _ = tracing_subscriber::fmt::try_init();

    let mut fixture = Fixture::new(options());
    let mut buf = BytesMut::new();
    encode(&add_station(station(1, "lab")), 0, &mut buf).unwrap();

    // a message type from a newer controller
    buf.put_u8(PROTOCOL_VERSION);
    buf.put_u8(0xee);
    buf.put_u16(HEADER_LEN as u16 + 3);
    buf.put_u32(1);
    buf.put_slice(&[1, 2, 3]);

    encode(&add_station(station(2, "lab")), 2, &mut buf).unwrap();
    encode(&Message::DelStation(DelStation { module_id: 1, sta: sta(1) }), 3, &mut buf).unwrap();

    assert_eq!(fixture.agent.handle_buffer(&buf).unwrap(), 3);
    assert_eq!(fixture.agent.stats().unknown_types(), 1);
    assert_eq!(
        kinds(&fixture.sent()),
        vec![
            MsgType::AddStationResponse,
            MsgType::StationStatus,
            MsgType::AddStationResponse,
            MsgType::StationStatus,
            MsgType::DelStationResponse,
        ]
    );
    assert!(fixture.agent.registry().station(sta(1)).is_none());
    assert!(fixture.agent.registry().station(sta(2)).is_some());
}

#[test]
fn broken_framing_rejects_the_whole_buffer() {
    let mut fixture = Fixture::new(options());
    let mut buf = BytesMut::new();
    encode(&add_station(station(1, "lab")), 0, &mut buf).unwrap();
    // declares more bytes than follow
    buf.put_u8(PROTOCOL_VERSION);
    buf.put_u8(MsgType::DelStation as u8);
    buf.put_u16(200);
    buf.put_u32(1);

    assert!(fixture.agent.handle_buffer(&buf).is_err());
    assert_eq!(fixture.agent.stats().malformed(), 1);
    assert!(fixture.agent.registry().station(sta(1)).is_none());
    assert!(fixture.sent().is_empty());
}

#[test]
fn status_push_covers_every_entity() {
    let mut fixture = Fixture::new(options());
    let agent = &fixture.agent;
    agent.handle(add_station(station(1, "lab"))).unwrap();
    agent
        .handle(Message::AddVap(AddVap {
            module_id: 1,
            rsrc: rsrc(),
            home_bssid: RADIO,
            ssid: "guest".into(),
        }))
        .unwrap();
    agent
        .handle(Message::AddTrafficRule(AddTrafficRule {
            module_id: 1,
            rule: TrafficRule { quantum: 4000, amsdu: true, dscp: 46, ssid: "lab".into() },
        }))
        .unwrap();
    assert_eq!(
        kinds(&fixture.sent()),
        vec![
            MsgType::AddStationResponse,
            MsgType::StationStatus,
            MsgType::VapStatus,
            MsgType::TrafficRuleStatus,
        ]
    );

    let status = fixture.agent.status_messages();
    assert_eq!(
        kinds(&status),
        vec![
            MsgType::Hello,
            MsgType::Caps,
            MsgType::StationStatus,
            MsgType::VapStatus,
            MsgType::PortStatus,
            MsgType::TrafficRuleStatus,
        ]
    );
    let Message::Caps(caps) = &status[1] else { panic!("expected caps") };
    assert_eq!(caps.wtp, WTP);
    assert_eq!(caps.resources, vec![rsrc()]);
}

#[test]
fn counters_and_cqm_are_answered() {
    let mut fixture = Fixture::new(options());
    let agent = &fixture.agent;
    agent.handle(add_station(station(1, "lab"))).unwrap();
    agent.receive(&lvap_agent::RxFrame {
        ta: sta(1),
        ra: RADIO,
        iface: 0,
        rssi: -42,
        length: 1500,
        ..Default::default()
    });
    agent.sweep();
    fixture.sent();

    let agent = &fixture.agent;
    agent.handle(Message::CountersRequest(CountersRequest { module_id: 9, sta: sta(1) })).unwrap();
    agent.handle(Message::CqmRequest(CqmRequest { module_id: 10, rsrc: rsrc() })).unwrap();
    assert!(agent.handle(Message::CountersRequest(CountersRequest { module_id: 11, sta: sta(5) })).is_err());

    let sent = fixture.sent();
    let [Message::CountersResponse(counters), Message::CqmResponse(cqm)] = sent.as_slice() else {
        panic!("unexpected replies {sent:?}");
    };
    assert_eq!(counters.module_id, 9);
    assert_eq!(counters.rx.iter().map(|c| c.count).sum::<u32>(), 1);
    assert!(counters.tx.is_empty());
    assert_eq!(cqm.module_id, 10);
    assert_eq!(cqm.entries.len(), 1);
    assert_eq!(cqm.entries[0].addr, sta(1));
}

#[test]
fn management_verdicts_reach_the_radio() {
    let fixture = Fixture::new(options());
    let response = MgmtResponse { sta: sta(1), bssid: RADIO, status: 0 };
    fixture.agent.handle(Message::AuthResponse(response.clone())).unwrap();
    fixture.agent.handle(Message::AssocResponse(MgmtResponse { status: 17, ..response })).unwrap();
    assert_eq!(fixture.sink.verdicts.lock().as_slice(), &[(sta(1), 0), (sta(1), 17)]);

    // reports only ever flow towards the controller
    assert!(fixture.agent.handle(fixture.agent.hello()).is_err());
}

async fn next(conn: &mut Framed<tokio::net::TcpStream, Codec>) -> Packet {
    tokio::time::timeout(Duration::from_secs(5), conn.next())
        .await
        .expect("controller read timed out")
        .expect("agent closed the connection")
        .expect("undecodable message")
}

#[tokio::test]
async fn driver_pushes_state_on_every_connect() {
    let _ = tracing_subscriber::fmt::try_init();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let options = options()
        .controller(listener.local_addr().unwrap())
        .hello_period(Duration::from_secs(60))
        .backoff(Duration::from_millis(10), Duration::from_millis(100));

    let (agent, driver) = Agent::spawn(
        options,
        std::sync::Arc::new(lvap_agent::NullSink),
        std::sync::Arc::new(GroupTable::default()),
    );
    agent.handle(add_station(station(1, "lab"))).unwrap();

    let (stream, _) = listener.accept().await.unwrap();
    let mut conn = Framed::new(stream, Codec::new());

    let first = next(&mut conn).await;
    assert_eq!(first.header.seq, 0);
    assert!(matches!(first.message, Message::Hello(_)));
    assert!(matches!(next(&mut conn).await.message, Message::Caps(_)));
    let Message::StationStatus(status) = next(&mut conn).await.message else {
        panic!("expected the station status");
    };
    assert_eq!(status.info.sta, sta(1));
    let last = next(&mut conn).await;
    assert!(matches!(last.message, Message::PortStatus(_)));

    conn.send(Message::DelStation(DelStation { module_id: 4, sta: sta(1) })).await.unwrap();
    let reply = next(&mut conn).await;
    let Message::DelStationResponse(resp) = reply.message else {
        panic!("expected the delete response");
    };
    assert_eq!((resp.module_id, resp.status), (4, StationResponse::SUCCESS));
    assert_eq!(reply.header.seq, last.header.seq + 1);

    // the agent reconnects and pushes its (now empty) state again
    drop(conn);
    let (stream, _) = listener.accept().await.unwrap();
    let mut conn = Framed::new(stream, Codec::new());
    let hello = next(&mut conn).await;
    assert!(matches!(hello.message, Message::Hello(_)));
    assert!(hello.header.seq > reply.header.seq);
    assert!(matches!(next(&mut conn).await.message, Message::Caps(_)));
    assert!(agent.stats().reconnects() >= 1);

    driver.abort();
}
