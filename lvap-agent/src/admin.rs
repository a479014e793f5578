//! Line-oriented introspection surface.
//!
//! Every command is one line of whitespace separated words; the reply is the
//! text to print. Lifecycle commands go through the same handlers as the
//! controller's messages.

use std::fmt::Write as _;

use lvap_common::EtherAddress;
use lvap_wire::{AddStation, DelStation, Message, StationFlags, StationInfo};

use crate::{trigger::TriggerKind, Agent};

const HELP: &str = "\
commands:
  help                                  this text
  stations                              registered stations
  vaps                                  shared access points
  ports                                 transmission policies
  masks                                 tenant mask per interface
  rules                                 traffic rules
  triggers                              registered triggers
  stats                                 agent counters
  neighbors <iface>                     link statistics heard on a radio
  rates <sta>                           rate adaptation state of a station
  debug on|off                          per-frame tracing
  add_station <sta> <ssid> <iface> [bssid]
  del_station <sta>";

/// Runs one admin command against `agent` and returns its output.
pub fn execute(agent: &Agent, line: &str) -> String {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&command, args)) = words.split_first() else { return String::new() };

    let result = match command {
        "help" => Ok(HELP.to_owned()),
        "stations" => Ok(stations(agent)),
        "vaps" => Ok(vaps(agent)),
        "ports" => Ok(ports(agent)),
        "masks" => Ok(masks(agent)),
        "rules" => Ok(rules(agent)),
        "triggers" => Ok(triggers(agent)),
        "stats" => Ok(stats(agent)),
        "neighbors" => neighbors(agent, args),
        "rates" => rates(agent, args),
        "debug" => debug(agent, args),
        "add_station" => add_station(agent, args),
        "del_station" => del_station(agent, args),
        other => Err(format!("unknown command '{other}', try 'help'")),
    };

    result.unwrap_or_else(|e| format!("error: {e}"))
}

fn stations(agent: &Agent) -> String {
    let mut out = String::new();
    for s in agent.registry().stations() {
        let _ = writeln!(
            out,
            "{} vbssid {} home {} ssid {} iface {} aid {} auth {} assoc {} mask {} uplink-only {}",
            s.addr,
            s.vbssid,
            s.home_bssid,
            s.ssid,
            s.iface,
            s.assoc_id,
            s.flags.authenticated(),
            s.flags.associated(),
            s.flags.set_mask(),
            s.flags.uplink_only(),
        );
    }
    out
}

fn vaps(agent: &Agent) -> String {
    let mut out = String::new();
    for v in agent.registry().vaps() {
        let _ = writeln!(out, "{} ssid {} iface {}", v.home_bssid, v.ssid, v.iface);
    }
    out
}

fn ports(agent: &Agent) -> String {
    let mut out = String::new();
    for (addr, iface, p) in agent.registry().policies() {
        let _ = writeln!(
            out,
            "{addr} iface {iface} no-ack {} rts/cts {} mcast {:?} ur {} rates {:?} ht {:?} tx {}/{}B rx {}/{}B",
            p.no_ack,
            p.rts_cts,
            p.mcast,
            p.ur_count,
            p.mcs,
            p.ht_mcs,
            p.tx.frames(),
            p.tx.bytes(),
            p.rx.frames(),
            p.rx.bytes(),
        );
    }
    out
}

fn masks(agent: &Agent) -> String {
    let mut out = String::new();
    for (iface, mask) in agent.registry().tenant_masks().into_iter().enumerate() {
        let _ = writeln!(out, "iface {iface} mask {mask}");
    }
    out
}

fn rules(agent: &Agent) -> String {
    let mut out = String::new();
    for r in agent.scheduler().rules() {
        let _ = writeln!(
            out,
            "{} quantum {} amsdu {} deficit {} queued {} neighbors {} in {} out {} dropped {}",
            r.key, r.quantum, r.amsdu, r.deficit, r.queued, r.neighbors, r.enqueued, r.dequeued, r.dropped,
        );
    }
    out
}

fn triggers(agent: &Agent) -> String {
    let mut out = String::new();
    for t in agent.triggers().triggers() {
        let _ = write!(out, "{} {} period {:?} ", t.id, t.name(), t.period);
        let _ = match &t.kind {
            TriggerKind::Rssi(c) => {
                writeln!(out, "sta {} {:?} {} dispatched {}", c.sta, c.relation, c.value, t.dispatched)
            }
            TriggerKind::Busyness(c) => writeln!(
                out,
                "iface {} {:?} {} dispatched {}",
                c.iface, c.relation, c.value, t.dispatched
            ),
            TriggerKind::Summary(s) => writeln!(
                out,
                "addr {} iface {} sent {} limit {:?} buffered {}",
                s.addr,
                s.iface,
                s.sent,
                s.limit,
                s.frames.len()
            ),
        };
    }
    out
}

fn stats(agent: &Agent) -> String {
    let s = agent.stats();
    format!(
        "tx {}B rx {}B\n\
         messages in {} out {} dropped {}\n\
         malformed {} unknown-types {} unknown-entities {}\n\
         queued {} queue-full {} reconnects {}\n\
         stations {} neighbors {} rate-records {} triggers {}\n",
        s.bytes_tx(),
        s.bytes_rx(),
        s.messages_rx(),
        s.messages_tx(),
        s.messages_dropped(),
        s.malformed(),
        s.unknown_types(),
        s.unknown_entities(),
        agent.scheduler().len(),
        s.queue_full(),
        s.reconnects(),
        agent.registry().station_count(),
        agent.link_stats().len(),
        agent.rates().len(),
        agent.triggers().len(),
    )
}

fn neighbors(agent: &Agent, args: &[&str]) -> Result<String, String> {
    let iface = parse_iface(args.first())?;
    let mut out = String::new();
    for (addr, n) in agent.link_stats().neighbors(iface) {
        let _ = writeln!(
            out,
            "{addr} rssi {} std {} ewma {} sma {} packets {} total {} silent {}",
            n.last_rssi_avg, n.last_rssi_std, n.ewma_rssi, n.sma_rssi, n.last_packets, n.hist_packets, n.silent_windows,
        );
    }
    Ok(out)
}

fn rates(agent: &Agent, args: &[&str]) -> Result<String, String> {
    let sta = parse_addr(args.first())?;
    let snapshot = agent.rates().snapshot(sta).ok_or_else(|| format!("no rate record for {sta}"))?;

    let mut out = format!(
        "best {} second {} prob {} lowest {} packets {} samples {}\n",
        snapshot.best_throughput,
        snapshot.second_throughput,
        snapshot.best_probability,
        snapshot.lowest,
        snapshot.packets,
        snapshot.samples,
    );
    for r in snapshot.rates {
        let _ = writeln!(
            out,
            "{:>6} prob {:5.1}% tp {:6} kbps {}/{}",
            r.rate.to_string(),
            r.probability * 100.0,
            r.throughput_kbps,
            r.successes,
            r.attempts,
        );
    }
    Ok(out)
}

fn debug(agent: &Agent, args: &[&str]) -> Result<String, String> {
    let verbose = match args.first() {
        Some(&"on") => true,
        Some(&"off") => false,
        _ => return Err("usage: debug on|off".to_owned()),
    };
    agent.stats().set_verbose(verbose);
    Ok(format!("debug {}", if verbose { "on" } else { "off" }))
}

fn add_station(agent: &Agent, args: &[&str]) -> Result<String, String> {
    let [sta, ssid, iface, rest @ ..] = args else {
        return Err("usage: add_station <sta> <ssid> <iface> [bssid]".to_owned());
    };
    let sta = parse_addr(Some(sta))?;
    let iface = parse_iface(Some(iface))?;
    let rsrc = agent.registry().element(iface).ok_or_else(|| format!("unknown interface {iface}"))?;
    let bssid = match rest.first() {
        Some(bssid) => parse_addr(Some(bssid))?,
        None => rsrc.hwaddr,
    };

    let info = StationInfo {
        flags: StationFlags::from_bits(
            StationFlags::AUTHENTICATED | StationFlags::ASSOCIATED | StationFlags::SET_MASK,
        ),
        rsrc,
        sta,
        home_bssid: bssid,
        vbssid: bssid,
        ssid: (*ssid).to_owned(),
        ..Default::default()
    };
    agent
        .handle(Message::AddStation(AddStation { module_id: 0, info }))
        .map_err(|e| e.to_string())?;
    Ok(format!("station {sta} added"))
}

fn del_station(agent: &Agent, args: &[&str]) -> Result<String, String> {
    let sta = parse_addr(args.first())?;
    agent
        .handle(Message::DelStation(DelStation { module_id: 0, sta }))
        .map_err(|e| e.to_string())?;
    Ok(format!("station {sta} deleted"))
}

fn parse_addr(arg: Option<&&str>) -> Result<EtherAddress, String> {
    let arg = arg.ok_or("missing address")?;
    arg.parse().map_err(|_| format!("invalid address '{arg}'"))
}

fn parse_iface(arg: Option<&&str>) -> Result<usize, String> {
    let arg = arg.ok_or("missing interface")?;
    arg.parse().map_err(|_| format!("invalid interface '{arg}'"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lvap_wire::{Band, ResourceElement};

    use super::*;
    use crate::{AgentOptions, GroupTable, NullSink};

    fn agent() -> Agent {
        let options = AgentOptions::default()
            .resource(ResourceElement::new("00:0D:B9:00:00:F0".parse().unwrap(), 36, Band::Ht20));
        Agent::new(options, Arc::new(NullSink), Arc::new(GroupTable::default())).0
    }

    #[test]
    fn lifecycle_commands() {
        let agent = agent();
        assert_eq!(execute(&agent, "add_station 02:00:00:00:00:01 lab 0"), "station 02:00:00:00:00:01 added");
        assert!(execute(&agent, "stations").starts_with("02:00:00:00:00:01"));
        assert!(execute(&agent, "rates 02:00:00:00:00:01").starts_with("best"));

        assert_eq!(execute(&agent, "del_station 02:00:00:00:00:01"), "station 02:00:00:00:00:01 deleted");
        assert!(execute(&agent, "stations").is_empty());
        assert!(execute(&agent, "del_station 02:00:00:00:00:01").starts_with("error:"));
    }

    #[test]
    fn bad_input() {
        let agent = agent();
        assert!(execute(&agent, "frobnicate").starts_with("error: unknown command"));
        assert!(execute(&agent, "add_station 02:00:00:00:00:01 lab 7").starts_with("error:"));
        assert!(execute(&agent, "neighbors x").starts_with("error:"));
        assert_eq!(execute(&agent, ""), "");
    }

    #[test]
    fn verbose_toggle() {
        let agent = agent();
        assert_eq!(execute(&agent, "debug on"), "debug on");
        assert!(agent.stats().verbose());
        execute(&agent, "debug off");
        assert!(!agent.stats().verbose());
    }
}
