mod controller;
mod rate;
mod registry;
mod scheduler;
mod trigger;

/// Shared fixtures.
mod helpers {
    use std::sync::Arc;

    use lvap_agent::{Agent, AgentOptions, FrameSink, GroupTable};
    use lvap_common::EtherAddress;
    use lvap_wire::{
        AddStation, Band, Message, ResourceElement, StationFlags, StationInfo,
    };
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    pub const WTP: EtherAddress = EtherAddress::new([0x00, 0x0d, 0xb9, 0x00, 0x00, 0x01]);
    pub const RADIO: EtherAddress = EtherAddress::new([0x00, 0x0d, 0xb9, 0x00, 0x00, 0xf0]);

    pub fn rsrc() -> ResourceElement {
        ResourceElement::new(RADIO, 36, Band::Ht20)
    }

    pub fn sta(last: u8) -> EtherAddress {
        EtherAddress::new([0x02, 0, 0, 0, 0, last])
    }

    pub fn options() -> AgentOptions {
        AgentOptions::default().wtp(WTP).resource(rsrc())
    }

    /// Records every management frame the agent asks for.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        pub deauths: Mutex<Vec<(EtherAddress, EtherAddress, u16)>>,
        pub verdicts: Mutex<Vec<(EtherAddress, u16)>>,
    }

    impl FrameSink for RecordingSink {
        fn deauthenticate(&self, sta: EtherAddress, bssid: EtherAddress, _: usize, reason: u16) {
            self.deauths.lock().push((sta, bssid, reason));
        }

        fn scan_response(&self, sta: EtherAddress, _: EtherAddress, status: u16) {
            self.verdicts.lock().push((sta, status));
        }

        fn auth_response(&self, sta: EtherAddress, _: EtherAddress, status: u16) {
            self.verdicts.lock().push((sta, status));
        }

        fn assoc_response(&self, sta: EtherAddress, _: EtherAddress, status: u16) {
            self.verdicts.lock().push((sta, status));
        }
    }

    pub struct Fixture {
        pub agent: Agent,
        pub outbox: mpsc::Receiver<Message>,
        pub sink: Arc<RecordingSink>,
        pub groups: Arc<GroupTable>,
    }

    impl Fixture {
        pub fn new(options: AgentOptions) -> Self {
            let sink = Arc::new(RecordingSink::default());
            let groups = Arc::new(GroupTable::default());
            let (agent, outbox) = Agent::new(options, sink.clone(), groups.clone());
            Self { agent, outbox, sink, groups }
        }

        /// Drains the outbox.
        pub fn sent(&mut self) -> Vec<Message> {
            let mut sent = Vec::new();
            while let Ok(msg) = self.outbox.try_recv() {
                sent.push(msg);
            }
            sent
        }
    }

    /// An attached station with address filtering, served from its own BSSID.
    pub fn station(last: u8, ssid: &str) -> StationInfo {
        StationInfo {
            flags: StationFlags::from_bits(
                StationFlags::AUTHENTICATED | StationFlags::ASSOCIATED | StationFlags::SET_MASK,
            ),
            assoc_id: last as u16,
            rsrc: rsrc(),
            sta: sta(last),
            home_bssid: EtherAddress::new([0x00, 0x0d, 0xb9, 0x00, 0x01, last]),
            vbssid: EtherAddress::new([0x00, 0x0d, 0xb9, 0x00, 0x01, last]),
            ssid: ssid.into(),
            ssids: vec![ssid.into()],
            ..Default::default()
        }
    }

    pub fn add_station(info: StationInfo) -> Message {
        Message::AddStation(AddStation { module_id: 1, info })
    }
}
