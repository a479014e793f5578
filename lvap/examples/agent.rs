use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::io::{AsyncBufReadExt, BufReader};

use lvap::{
    admin,
    wire::{Band, NetworkPort, ResourceElement},
    Agent, AgentOptions, EtherAddress, GroupTable, NullSink,
};

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt::try_init();

    // Usage: agent [controller address]
    let controller: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:4433".to_owned())
        .parse()
        .expect("invalid controller address");

    let wtp: EtherAddress = "00:0D:B9:2F:56:64".parse().unwrap();
    let options = AgentOptions::default()
        .wtp(wtp)
        .controller(controller)
        .resource(ResourceElement::new("04:F0:21:09:F9:9F".parse().unwrap(), 36, Band::Ht20))
        .resource(ResourceElement::new("D4:CA:6D:14:C2:09".parse().unwrap(), 6, Band::Ht20))
        .port(NetworkPort { hwaddr: wtp, port_id: 1, name: "eth0".into() })
        .hello_period(Duration::from_secs(2));

    let (agent, driver) = Agent::spawn(options, Arc::new(NullSink), Arc::new(GroupTable::default()));

    // Feed admin commands from stdin until it closes
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let out = admin::execute(&agent, &line);
        if !out.is_empty() {
            println!("{}", out.trim_end());
        }
    }

    driver.abort();
}
