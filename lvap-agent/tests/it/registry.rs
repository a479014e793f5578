use lvap_agent::{Registry, RegistryError, Upsert};
use lvap_common::EtherAddress;
use lvap_wire::{DelStation, Message, StationResponse};

use crate::helpers::*;

#[test]
fn upsert_is_idempotent() {
    let _ = tracing_subscriber::fmt::try_init();

    let registry = Registry::new(vec![rsrc()]);
    let mut info = station(1, "lab");

    assert_eq!(registry.upsert_station(&info).unwrap(), Upsert::Created);
    assert_eq!(registry.mask_updates(), 1);

    info.ssids = vec!["lab".into(), "guest".into()];
    info.assoc_id = 42;
    assert_eq!(registry.upsert_station(&info).unwrap(), Upsert::Updated);

    assert_eq!(registry.station_count(), 1);
    let record = registry.station(sta(1)).unwrap();
    assert_eq!(record.ssids, vec!["lab".to_owned(), "guest".to_owned()]);
    assert_eq!(record.assoc_id, 42);
    assert_eq!(registry.mask_updates(), 1);
}

#[test]
fn tenant_mask_covers_every_bssid() {
    let registry = Registry::new(vec![rsrc()]);
    assert_eq!(registry.tenant_mask(0), Some(EtherAddress::BROADCAST));

    // differs from the radio address in the last two octets
    registry.upsert_station(&station(1, "lab")).unwrap();
    let expected = !(station(1, "lab").vbssid ^ RADIO);
    assert_eq!(registry.tenant_mask(0), Some(expected));

    let vap: EtherAddress = "00:0D:B9:00:00:F3".parse().unwrap();
    registry.upsert_vap(rsrc(), vap, "guest").unwrap();
    assert_eq!(registry.tenant_mask(0), Some(expected & !(vap ^ RADIO)));

    registry.remove_station(sta(1)).unwrap();
    registry.remove_vap(vap).unwrap();
    assert_eq!(registry.tenant_mask(0), Some(EtherAddress::BROADCAST));
}

#[test]
fn add_then_delete_then_lookup() {
    let mut fixture = Fixture::new(options());
    let agent = &fixture.agent;

    agent.handle(add_station(station(0xaa, "lab"))).unwrap();
    assert!(agent.registry().station(sta(0xaa)).is_some());

    agent.handle(Message::DelStation(DelStation { module_id: 3, sta: sta(0xaa) })).unwrap();
    assert!(agent.registry().station(sta(0xaa)).is_none());
    assert!(!agent.rates().contains(sta(0xaa)));
    assert!(agent.registry().policies().is_empty());

    // a second delete reports the unknown station and changes nothing
    let err = agent.handle(Message::DelStation(DelStation { module_id: 4, sta: sta(0xaa) }));
    assert!(err.is_err());
    assert_eq!(agent.stats().unknown_entities(), 1);

    let responses: Vec<_> = fixture
        .sent()
        .into_iter()
        .filter_map(|m| match m {
            Message::DelStationResponse(resp) => Some((resp.module_id, resp.status)),
            _ => None,
        })
        .collect();
    assert_eq!(
        responses,
        vec![(3, StationResponse::SUCCESS), (4, StationResponse::UNKNOWN)]
    );
}

#[test]
fn shared_bssid_station_is_deauthenticated_on_delete() {
    let fixture = Fixture::new(options());
    let mut info = station(1, "lab");
    info.home_bssid = "00:0D:B9:00:02:00".parse().unwrap();
    fixture.agent.handle(add_station(info.clone())).unwrap();

    // a station on its own BSSID is removed silently
    fixture.agent.handle(add_station(station(2, "lab"))).unwrap();

    fixture.agent.delete_station(sta(1)).unwrap();
    fixture.agent.delete_station(sta(2)).unwrap();

    let deauths = fixture.sink.deauths.lock();
    assert_eq!(deauths.as_slice(), &[(sta(1), info.vbssid, 1)]);
}

#[test]
fn station_on_unknown_radio_is_refused() {
    let registry = Registry::new(vec![rsrc()]);
    let mut info = station(1, "lab");
    info.rsrc.channel = 1;

    let err = registry.upsert_station(&info).unwrap_err();
    assert_eq!(err, RegistryError::UnknownResource(info.rsrc));
    assert_eq!(registry.station_count(), 0);
    assert_eq!(registry.mask_updates(), 0);
}
