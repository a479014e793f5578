use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use lvap_common::EtherAddress;
use lvap_wire::{
    decode_all, AddBusynessTrigger, AddRssiTrigger, AddStation, AddSummaryTrigger,
    AddTrafficRule, AddVap, AssocRequest, AuthRequest, Band, Caps, CountersRequest,
    CountersResponse, CqmRequest, CqmResponse, Decoded, DelStation, DelTrafficRule, DelVap,
    Hello, Message, MgmtResponse, PortStatus, ScanRequest, ResourceElement, SetPort,
    StationResponse, StationStatus, TrafficRule, TrafficRuleStatus, VapStatus,
};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::{
    frame::{
        FrameSink, GroupMembership, Outbound, RxFrame, Scheduled, Stage, TxFrame, TxStatus,
        REASON_UNSPECIFIED,
    },
    rate::{airtime::airtime, Rate, RateController, RateSet},
    registry::{Registry, RegistryError, Station, Upsert},
    scheduler::{Classifier, RuleKey, Scheduler},
    trigger::{Trigger, TriggerContext, TriggerEngine},
    AddOutcome, AgentError, AgentOptions, AgentStats, LinkStatsTracker,
};

mod backoff;
pub use backoff::ExponentialBackoff;

mod driver;
pub use driver::AgentDriver;

/// The access point agent.
///
/// Cheap to clone: every clone shares the same state. All methods are
/// synchronous and never wait on I/O, so they can be called from the host's
/// packet path. Messages for the controller are queued on a bounded outbox and
/// dropped (and counted) when it is full.
#[derive(Debug, Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

#[derive(Debug)]
struct AgentInner {
    options: AgentOptions,
    registry: Arc<Registry>,
    link: LinkStatsTracker,
    rates: RateController,
    scheduler: Scheduler,
    triggers: Arc<TriggerEngine>,
    classifier: Classifier,
    sink: SinkHandle,
    outbox: mpsc::Sender<Message>,
    stats: Arc<AgentStats>,
}

struct SinkHandle(Arc<dyn FrameSink>);

impl std::fmt::Debug for SinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FrameSink")
    }
}

impl Agent {
    /// Creates an agent. Returns the receiving end of the outbox, which an
    /// [`AgentDriver`] forwards to the controller.
    pub fn new(
        options: AgentOptions,
        sink: Arc<dyn FrameSink>,
        groups: Arc<dyn GroupMembership>,
    ) -> (Self, mpsc::Receiver<Message>) {
        let (outbox, rx) = mpsc::channel(options.outbound_buffer.max(1));
        let registry = Arc::new(Registry::new(options.resources.clone()));
        let stats = Arc::new(AgentStats::default());

        let inner = AgentInner {
            link: LinkStatsTracker::new(options.sma_window, options.ewma_weight, options.silent_windows),
            rates: RateController::new(options.rate.clone()),
            scheduler: Scheduler::new(options.scheduler.clone()),
            triggers: Arc::new(TriggerEngine::new()),
            classifier: Classifier::new(Arc::clone(&registry), groups, Arc::clone(&stats)),
            sink: SinkHandle(sink),
            registry,
            outbox,
            stats,
            options,
        };

        (Self { inner: Arc::new(inner) }, rx)
    }

    /// Creates an agent and spawns the driver of its controller connection on
    /// the current runtime.
    pub fn spawn(
        options: AgentOptions,
        sink: Arc<dyn FrameSink>,
        groups: Arc<dyn GroupMembership>,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        let (agent, outbox) = Self::new(options, sink, groups);
        let driver = AgentDriver::new(agent.clone(), outbox);
        (agent, tokio::spawn(driver))
    }

    /// Options the agent was built with.
    pub fn options(&self) -> &AgentOptions {
        &self.inner.options
    }

    /// Address of this access point.
    #[inline]
    pub fn wtp(&self) -> EtherAddress {
        self.inner.options.wtp
    }

    /// Station, VAP and policy registry.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Per-neighbor link statistics.
    pub fn link_stats(&self) -> &LinkStatsTracker {
        &self.inner.link
    }

    /// Per-station rate adaptation.
    pub fn rates(&self) -> &RateController {
        &self.inner.rates
    }

    /// Downlink traffic scheduler.
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// Registered triggers.
    pub fn triggers(&self) -> &TriggerEngine {
        &self.inner.triggers
    }

    /// Agent counters.
    pub fn stats(&self) -> &AgentStats {
        &self.inner.stats
    }

    /// Decodes a buffer of concatenated controller messages and handles them
    /// in order. Returns the number of messages handled.
    ///
    /// A buffer whose framing cannot be trusted is rejected as a whole. Inside
    /// a well-framed buffer, unknown and malformed messages are skipped and
    /// failing handlers do not stop the ones after them.
    pub fn handle_buffer(&self, buf: &[u8]) -> Result<usize, AgentError> {
        let decoded = decode_all(buf).map_err(|e| {
            if self.inner.stats.increment_malformed() {
                warn!(len = buf.len(), "Rejecting control buffer: {e}");
            }
            e
        })?;

        let mut handled = 0;
        for item in decoded {
            match item {
                Decoded::Packet(packet) => {
                    trace!(seq = packet.header.seq, kind = ?packet.header.kind(), "control message");
                    if let Err(e) = self.handle(packet.message) {
                        debug!(seq = packet.header.seq, "control message failed: {e}");
                    }
                    handled += 1;
                }
                Decoded::Unknown(header) => {
                    if self.inner.stats.increment_unknown_types() {
                        warn!(msg_type = header.msg_type, seq = header.seq, "Skipping unknown message type");
                    }
                }
                Decoded::Malformed { header, error } => {
                    if self.inner.stats.increment_malformed() {
                        warn!(msg_type = header.msg_type, seq = header.seq, "Dropping malformed message: {error}");
                    }
                }
            }
        }

        Ok(handled)
    }

    /// Handles one controller message.
    pub fn handle(&self, message: Message) -> Result<(), AgentError> {
        self.inner.stats.increment_messages_rx();

        let result = match message {
            Message::AddStation(req) => self.on_add_station(req),
            Message::DelStation(req) => self.on_del_station(req),
            Message::SetPort(port) => self.on_set_port(&port),
            Message::AddVap(req) => self.on_add_vap(req),
            Message::DelVap(req) => self.on_del_vap(req),
            Message::CountersRequest(req) => self.on_counters(req),
            Message::CqmRequest(req) => self.on_cqm(req),
            Message::AddTrafficRule(req) => self.on_add_traffic_rule(req),
            Message::DelTrafficRule(req) => self.on_del_traffic_rule(req),
            Message::AddRssiTrigger(req) => self.on_add_rssi_trigger(req),
            Message::AddBusynessTrigger(req) => self.on_add_busyness_trigger(req),
            Message::AddSummaryTrigger(req) => self.on_add_summary_trigger(req),
            Message::DelRssiTrigger(req)
            | Message::DelBusynessTrigger(req)
            | Message::DelSummaryTrigger(req) => self.on_del_trigger(req.id),
            Message::ScanResponse(resp) => {
                self.forward(&resp, |sink, r| sink.scan_response(r.sta, r.bssid, r.status))
            }
            Message::AuthResponse(resp) => {
                self.forward(&resp, |sink, r| sink.auth_response(r.sta, r.bssid, r.status))
            }
            Message::AssocResponse(resp) => {
                self.forward(&resp, |sink, r| sink.assoc_response(r.sta, r.bssid, r.status))
            }
            other => {
                warn!(kind = ?other.msg_type(), "Ignoring message sent in the wrong direction");
                Err(AgentError::Unexpected(other.msg_type()))
            }
        };

        if let Err(AgentError::Registry(_) | AgentError::UnknownTrigger(_)) = &result {
            self.inner.stats.increment_unknown_entities();
        }
        result
    }

    fn on_add_station(&self, req: AddStation) -> Result<(), AgentError> {
        let sta = req.info.sta;
        match self.inner.registry.upsert_station(&req.info) {
            Ok(outcome) => {
                if outcome != Upsert::Updated {
                    self.rebuild_rates(sta);
                }
                self.send(Message::AddStationResponse(self.station_response(
                    req.module_id,
                    sta,
                    StationResponse::SUCCESS,
                )));
                if let Some(status) = self.station_status(sta) {
                    self.send(status);
                }
                Ok(())
            }
            Err(e) => {
                self.send(Message::AddStationResponse(self.station_response(
                    req.module_id,
                    sta,
                    StationResponse::UNKNOWN,
                )));
                Err(e.into())
            }
        }
    }

    fn on_del_station(&self, req: DelStation) -> Result<(), AgentError> {
        let result = self.delete_station(req.sta);
        let status =
            if result.is_ok() { StationResponse::SUCCESS } else { StationResponse::UNKNOWN };
        self.send(Message::DelStationResponse(self.station_response(req.module_id, req.sta, status)));
        result.map(|_| ()).map_err(Into::into)
    }

    fn station_response(&self, module_id: u32, sta: EtherAddress, status: u32) -> StationResponse {
        StationResponse { module_id, wtp: self.wtp(), sta, status }
    }

    /// Removes a station together with its rate record and policy.
    ///
    /// A station served from a BSSID other than its home one is sent a
    /// deauthentication first, since it may still consider itself attached.
    pub fn delete_station(&self, sta: EtherAddress) -> Result<Station, RegistryError> {
        let station =
            self.inner.registry.station(sta).ok_or(RegistryError::UnknownStation(sta))?;

        if station.vbssid != station.home_bssid {
            self.inner.sink.0.deauthenticate(sta, station.vbssid, station.iface, REASON_UNSPECIFIED);
        }

        let station = self.inner.registry.remove_station(sta)?;
        self.inner.rates.evict(sta);
        info!(%sta, iface = station.iface, "station deleted");
        Ok(station)
    }

    /// Rebuilds the rate record of a unicast station from its current policy.
    fn rebuild_rates(&self, sta: EtherAddress) {
        let registry = &self.inner.registry;
        let Some(iface) = registry.station(sta).map(|s| s.iface) else { return };
        let (Some(rsrc), Some(policy)) = (registry.element(iface), registry.policy(sta, iface))
        else {
            return;
        };
        self.inner.rates.rebuild(sta, &policy.candidates(&rsrc), rsrc.band == Band::Ht40);
    }

    fn on_set_port(&self, port: &SetPort) -> Result<(), AgentError> {
        let iface = self.inner.registry.set_policy(port)?;
        if !port.sta.is_group()
            && self.inner.registry.station(port.sta).is_some_and(|s| s.iface == iface)
        {
            self.rebuild_rates(port.sta);
        }
        if let Some(status) = self.port_status(port.sta, iface) {
            self.send(status);
        }
        Ok(())
    }

    fn on_add_vap(&self, req: AddVap) -> Result<(), AgentError> {
        self.inner.registry.upsert_vap(req.rsrc, req.home_bssid, &req.ssid)?;
        if let Some(status) = self.vap_status(req.home_bssid) {
            self.send(status);
        }
        Ok(())
    }

    fn on_del_vap(&self, req: DelVap) -> Result<(), AgentError> {
        self.inner.registry.remove_vap(req.home_bssid)?;
        Ok(())
    }

    fn on_counters(&self, req: CountersRequest) -> Result<(), AgentError> {
        let (tx, rx) = self.inner.registry.counters(req.sta)?;
        self.send(Message::CountersResponse(CountersResponse {
            module_id: req.module_id,
            wtp: self.wtp(),
            sta: req.sta,
            tx,
            rx,
        }));
        Ok(())
    }

    fn on_cqm(&self, req: CqmRequest) -> Result<(), AgentError> {
        let iface = self.iface(&req.rsrc)?;
        let entries = self
            .inner
            .link
            .neighbors(iface)
            .into_iter()
            .map(|(addr, snapshot)| snapshot.to_cqm(addr))
            .collect();
        self.send(Message::CqmResponse(CqmResponse {
            module_id: req.module_id,
            wtp: self.wtp(),
            rsrc: req.rsrc,
            entries,
        }));
        Ok(())
    }

    fn on_add_traffic_rule(&self, req: AddTrafficRule) -> Result<(), AgentError> {
        let rule = req.rule;
        let key = RuleKey::new(rule.ssid, rule.dscp);
        self.inner.scheduler.add_rule(key.clone(), rule.quantum, rule.amsdu);
        if let Some(status) = self.rule_status(&key) {
            self.send(status);
        }
        Ok(())
    }

    fn on_del_traffic_rule(&self, req: DelTrafficRule) -> Result<(), AgentError> {
        let key = RuleKey::new(req.ssid, req.dscp);
        if !self.inner.scheduler.remove_rule(&key) {
            debug!(rule = %key, "no such traffic rule");
        }
        Ok(())
    }

    fn on_add_rssi_trigger(&self, req: AddRssiTrigger) -> Result<(), AgentError> {
        let period = Duration::from_millis(req.period_ms.into());
        self.add_trigger(Trigger::rssi(req.id, req.sta, req.relation, req.value, period));
        Ok(())
    }

    fn on_add_busyness_trigger(&self, req: AddBusynessTrigger) -> Result<(), AgentError> {
        let iface = self.iface(&req.rsrc)?;
        let period = Duration::from_millis(req.period_ms.into());
        self.add_trigger(Trigger::busyness(req.id, iface, req.relation, req.value, period));
        Ok(())
    }

    fn on_add_summary_trigger(&self, req: AddSummaryTrigger) -> Result<(), AgentError> {
        let iface = self.iface(&req.rsrc)?;
        let period = Duration::from_millis(req.period_ms.into());
        let capacity = self.inner.options.summary_capacity;
        self.add_trigger(Trigger::summary(req.id, req.addr, iface, req.limit, period, capacity));
        Ok(())
    }

    /// Registers a trigger evaluated against this agent's telemetry.
    pub fn add_trigger(&self, trigger: Trigger) -> AddOutcome {
        let ctx: Weak<dyn TriggerContext> = Arc::downgrade(&self.inner) as Weak<AgentInner>;
        self.inner.triggers.add(trigger, ctx)
    }

    fn on_del_trigger(&self, id: u32) -> Result<(), AgentError> {
        self.inner.triggers.remove(id).map(|_| ()).ok_or(AgentError::UnknownTrigger(id))
    }

    /// Evaluates trigger `id` once, as its timer would.
    pub fn evaluate_trigger(&self, id: u32) {
        self.inner.triggers.tick(id, self.inner.as_ref());
    }

    fn forward(
        &self,
        resp: &MgmtResponse,
        f: impl FnOnce(&dyn FrameSink, &MgmtResponse),
    ) -> Result<(), AgentError> {
        trace!(sta = %resp.sta, bssid = %resp.bssid, status = resp.status, "management verdict");
        f(self.inner.sink.0.as_ref(), resp);
        Ok(())
    }

    fn iface(&self, rsrc: &ResourceElement) -> Result<usize, RegistryError> {
        self.inner.registry.iface(rsrc).ok_or(RegistryError::UnknownResource(*rsrc))
    }

    /// Relays a scan request heard on `iface` to the controller.
    pub fn scan_request(&self, sta: EtherAddress, iface: usize, ssid: &str) -> Result<(), AgentError> {
        let rsrc = self.element(iface)?;
        self.send(Message::ScanRequest(ScanRequest {
            wtp: self.wtp(),
            sta,
            rsrc,
            ssid: ssid.to_owned(),
        }));
        Ok(())
    }

    /// Relays an authentication request to the controller.
    pub fn auth_request(&self, sta: EtherAddress, bssid: EtherAddress) {
        self.send(Message::AuthRequest(AuthRequest { wtp: self.wtp(), sta, bssid }));
    }

    /// Relays an association request to the controller.
    pub fn assoc_request(&self, sta: EtherAddress, bssid: EtherAddress, ssid: &str) {
        self.send(Message::AssocRequest(AssocRequest {
            wtp: self.wtp(),
            sta,
            bssid,
            ssid: ssid.to_owned(),
        }));
    }

    fn element(&self, iface: usize) -> Result<ResourceElement, RegistryError> {
        self.inner.registry.element(iface).ok_or(RegistryError::UnknownInterface(iface))
    }

    /// Keep-alive carrying the hello period and the byte counters.
    pub fn hello(&self) -> Message {
        let stats = &self.inner.stats;
        Message::Hello(Hello {
            wtp: self.wtp(),
            period_ms: u32::try_from(self.inner.options.hello_period.as_millis()).unwrap_or(u32::MAX),
            uplink_bytes: stats.bytes_rx(),
            downlink_bytes: stats.bytes_tx(),
        })
    }

    /// Capability report: radios and network ports.
    pub fn caps(&self) -> Message {
        Message::Caps(Caps {
            wtp: self.wtp(),
            resources: self.inner.registry.resources().elements().to_vec(),
            ports: self.inner.options.ports.clone(),
        })
    }

    /// Status of station `sta`, or `None` if it is not registered.
    pub fn station_status(&self, sta: EtherAddress) -> Option<Message> {
        let station = self.inner.registry.station(sta)?;
        Some(Message::StationStatus(StationStatus { wtp: self.wtp(), info: station.info() }))
    }

    /// Status of the VAP at `home_bssid`, or `None` if it is not registered.
    pub fn vap_status(&self, home_bssid: EtherAddress) -> Option<Message> {
        let vap = self.inner.registry.vap(home_bssid)?;
        Some(Message::VapStatus(VapStatus {
            wtp: self.wtp(),
            rsrc: vap.rsrc,
            home_bssid: vap.home_bssid,
            ssid: vap.ssid,
        }))
    }

    /// Transmission policy in effect for `addr` on `iface`.
    pub fn port_status(&self, addr: EtherAddress, iface: usize) -> Option<Message> {
        let rsrc = self.inner.registry.element(iface)?;
        let policy = self.inner.registry.policy(addr, iface)?;
        Some(Message::PortStatus(PortStatus { wtp: self.wtp(), port: policy.to_port(addr, rsrc) }))
    }

    /// Status of the traffic rule `key`.
    pub fn rule_status(&self, key: &RuleKey) -> Option<Message> {
        let info = self.inner.scheduler.rule(key)?;
        Some(Message::TrafficRuleStatus(TrafficRuleStatus {
            wtp: self.wtp(),
            rule: TrafficRule {
                quantum: info.quantum,
                amsdu: info.amsdu,
                dscp: info.key.dscp,
                ssid: info.key.ssid,
            },
        }))
    }

    /// Full state push, sent every time the controller connection comes up:
    /// hello, capabilities, then the status of every registered entity.
    pub fn status_messages(&self) -> Vec<Message> {
        let registry = &self.inner.registry;
        let mut messages = vec![self.hello(), self.caps()];

        messages.extend(registry.stations().into_iter().map(|s| {
            Message::StationStatus(StationStatus { wtp: self.wtp(), info: s.info() })
        }));
        messages.extend(registry.vaps().into_iter().map(|v| {
            Message::VapStatus(VapStatus {
                wtp: self.wtp(),
                rsrc: v.rsrc,
                home_bssid: v.home_bssid,
                ssid: v.ssid,
            })
        }));
        messages.extend(
            registry.policies().into_iter().filter_map(|(addr, iface, _)| self.port_status(addr, iface)),
        );
        messages.extend(
            self.inner.scheduler.rules().into_iter().filter_map(|r| self.rule_status(&r.key)),
        );

        messages
    }

    /// Queues a message for the controller. Dropped when the outbox is full.
    pub fn send(&self, message: Message) {
        self.inner.send(message);
    }

    /// Classifies an outbound frame and queues the resulting copies. Returns
    /// how many were queued.
    pub fn transmit(&self, frame: TxFrame) -> usize {
        let inner = &self.inner;
        let mut queued = 0;
        for classified in inner.classifier.process(frame) {
            match inner.scheduler.enqueue(&classified.ssid, classified.dscp, classified.out) {
                Ok(()) => queued += 1,
                Err(_) => inner.stats.increment_queue_full(),
            }
        }
        queued
    }

    /// Releases the next frame chosen by the scheduler, with its rates.
    pub fn next_frame(&self) -> Option<Scheduled> {
        let inner = &self.inner;
        let out = inner.scheduler.dequeue(|out| self.cost(out))?;
        let rates = inner.rates.select(out.ra).unwrap_or_else(|| self.fallback_rates(&out));

        let len = out.frame.len();
        inner.registry.record_tx(out.ra, out.frame.iface, len);
        inner.stats.increment_tx(len);

        Some(Scheduled { out, rates })
    }

    /// Waits until the scheduler has frames, then releases the next one.
    pub async fn next_frame_ready(&self) -> Scheduled {
        loop {
            if let Some(scheduled) = self.next_frame() {
                return scheduled;
            }
            if self.inner.scheduler.is_parked() {
                self.inner.scheduler.ready().await;
            }
        }
    }

    /// Airtime of an outbound frame, in microseconds.
    fn cost(&self, out: &Outbound) -> u32 {
        let len = out.frame.len();
        if let Some(airtime) = self.inner.rates.airtime(out.ra, len) {
            return airtime;
        }
        let (rate, ht40) = self.lowest_rate(out);
        airtime(rate, len, ht40)
    }

    /// The most robust rate allowed towards the receiver of `out`.
    fn lowest_rate(&self, out: &Outbound) -> (Rate, bool) {
        let registry = &self.inner.registry;
        let iface = out.frame.iface;
        let Some(rsrc) = registry.element(iface) else { return (Rate::legacy(2), false) };
        let rate = registry
            .with_policy(out.ra, iface, |p| p.candidates(&rsrc).first().copied())
            .flatten()
            .unwrap_or(if rsrc.channel > 14 { Rate::legacy(12) } else { Rate::legacy(2) });
        (rate, rsrc.band == Band::Ht40)
    }

    fn fallback_rates(&self, out: &Outbound) -> RateSet {
        let (rate, _) = self.lowest_rate(out);
        // group frames are not acknowledged
        let tries = if out.ra.is_group() { 1 } else { self.inner.rates.options().retries[3].max(1) };
        let mut rates = RateSet::default();
        rates.push(rate, tries);
        rates
    }

    /// Feeds a transmission outcome to rate adaptation.
    pub fn tx_status(&self, status: &TxStatus) {
        self.inner.rates.feedback(status);
    }

    /// Accounts a frame heard on a radio.
    pub fn receive(&self, frame: &RxFrame) {
        let inner = &self.inner;
        inner.link.observe(frame);
        inner.triggers.observe(frame);
        let len = frame.length as usize;
        inner.registry.record_rx(frame.ta, frame.iface, len);
        inner.stats.increment_rx(len);
    }

    /// Records a channel busyness sample for a radio.
    pub fn record_busyness(&self, iface: usize, busy: u32) {
        self.inner.link.record_busyness(iface, busy);
    }

    /// Folds the link-stats window and evicts silent neighbors.
    pub fn sweep(&self) -> usize {
        let evicted = self.inner.link.sweep();
        if evicted > 0 {
            debug!(evicted, "silent neighbors evicted");
        }
        evicted
    }

    /// Recomputes rate statistics. Runs once per adaptation period.
    pub fn update_rates(&self) {
        self.inner.rates.update();
    }
}

impl AgentInner {
    fn send(&self, message: Message) {
        let kind = message.msg_type();
        match self.outbox.try_send(message) {
            Ok(()) => self.stats.increment_messages_tx(),
            Err(e) => {
                self.stats.increment_messages_dropped();
                debug!(?kind, "Dropping outbound message: {e}");
            }
        }
    }
}

impl TriggerContext for AgentInner {
    fn wtp(&self) -> EtherAddress {
        self.options.wtp
    }

    fn rssi(&self, sta: EtherAddress) -> Option<(i8, ResourceElement)> {
        let (rssi, iface) = self.link.rssi(sta)?;
        Some((rssi, self.registry.element(iface)?))
    }

    fn busyness(&self, iface: usize) -> Option<u32> {
        self.link.busyness(iface)
    }

    fn resource(&self, iface: usize) -> Option<ResourceElement> {
        self.registry.element(iface)
    }

    fn report(&self, message: Message) {
        self.send(message);
    }
}

#[cfg(test)]
mod tests {
    use lvap_wire::{encode, StationFlags, StationInfo};

    use super::*;
    use crate::{GroupTable, NullSink};

    fn options() -> AgentOptions {
        AgentOptions::default()
            .wtp("00:0D:B9:00:00:01".parse().unwrap())
            .resource(ResourceElement::new("00:0D:B9:00:00:F0".parse().unwrap(), 6, Band::Ht20))
    }

    fn agent() -> (Agent, mpsc::Receiver<Message>) {
        Agent::new(options(), Arc::new(NullSink), Arc::new(GroupTable::default()))
    }

    fn add_station(sta: &str) -> Message {
        Message::AddStation(AddStation {
            module_id: 9,
            info: StationInfo {
                flags: StationFlags::from_bits(StationFlags::AUTHENTICATED | StationFlags::ASSOCIATED),
                rsrc: options().resources[0],
                sta: sta.parse().unwrap(),
                ssid: "lab".into(),
                ..Default::default()
            },
        })
    }

    #[test]
    fn add_station_is_answered() {
        let (agent, mut rx) = agent();
        agent.handle(add_station("02:00:00:00:00:01")).unwrap();

        let Ok(Message::AddStationResponse(resp)) = rx.try_recv() else { panic!("no response") };
        assert_eq!(resp.module_id, 9);
        assert_eq!(resp.status, StationResponse::SUCCESS);
        assert!(matches!(rx.try_recv(), Ok(Message::StationStatus(_))));
        assert!(agent.rates().contains("02:00:00:00:00:01".parse().unwrap()));
    }

    #[test]
    fn buffer_skips_unknown_types() {
        let (agent, _rx) = agent();
        let mut buf = bytes::BytesMut::new();
        encode(&add_station("02:00:00:00:00:01"), 0, &mut buf).unwrap();
        // a well-framed message of an unassigned type
        buf.extend_from_slice(&[lvap_wire::PROTOCOL_VERSION, 0xee, 0, 8, 0, 0, 0, 1]);
        encode(&add_station("02:00:00:00:00:02"), 2, &mut buf).unwrap();

        assert_eq!(agent.handle_buffer(&buf).unwrap(), 2);
        assert_eq!(agent.registry().station_count(), 2);
        assert_eq!(agent.stats().unknown_types(), 1);

        // a truncated tail fails the whole buffer
        let mut truncated = buf.clone();
        truncated.truncate(buf.len() - 3);
        assert!(agent.handle_buffer(&truncated).is_err());
    }

    #[test]
    fn full_outbox_drops() {
        let (agent, _rx) = Agent::new(
            options().outbound_buffer(1),
            Arc::new(NullSink),
            Arc::new(GroupTable::default()),
        );
        agent.send(agent.hello());
        agent.send(agent.hello());
        assert_eq!(agent.stats().messages_tx(), 1);
        assert_eq!(agent.stats().messages_dropped(), 1);
    }
}
