use std::{
    collections::VecDeque,
    fmt,
    future::Future,
    io,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use futures::{FutureExt, SinkExt, StreamExt};
use lvap_wire::{Codec, Message};
use rand::Rng;
use tokio::{
    net::TcpStream,
    sync::mpsc,
    time::{self, Instant, Interval, MissedTickBehavior, Sleep},
};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, trace, warn};

use super::{Agent, ExponentialBackoff};

/// A connection task that resolves to the controller stream.
type ConnTask = Pin<Box<dyn Future<Output = io::Result<TcpStream>> + Send>>;

type Conn = Framed<TcpStream, Codec>;

enum ConnectionState {
    Active {
        conn: Conn,
    },
    Inactive {
        /// The current backoff state.
        backoff: ExponentialBackoff,
    },
}

/// Drives the controller connection of an [`Agent`], and its periodic
/// maintenance. Endless future: abort its task to stop the agent.
///
/// The driver connects with exponential backoff. Every time the connection
/// comes up it pushes the full agent state, then forwards the agent's outbox
/// and sends a jittered hello. Inbound messages are handed to the agent in the
/// order they arrive. Outbound messages produced while disconnected are
/// dropped: the state push on reconnect supersedes them.
///
/// The egress queue holds at most `outbound_buffer` messages. While it is full
/// the outbox is left alone, so a controller that stops reading backs up into
/// the agent's bounded outbox, which drops and counts.
pub struct AgentDriver {
    agent: Agent,
    from_agent: mpsc::Receiver<Message>,
    state: ConnectionState,
    conn_task: Option<ConnTask>,
    egress: VecDeque<Message>,
    egress_cap: usize,
    /// Sequence number carried over to the next connection.
    next_seq: u32,
    hello: Pin<Box<Sleep>>,
    sweep: Interval,
    rate_update: Interval,
}

impl fmt::Debug for AgentDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentDriver")
            .field("controller", &self.agent.options().controller)
            .field("connected", &self.is_connected())
            .field("egress", &self.egress.len())
            .finish_non_exhaustive()
    }
}

impl AgentDriver {
    /// Creates the driver. Must be called from within a tokio runtime.
    pub fn new(agent: Agent, from_agent: mpsc::Receiver<Message>) -> Self {
        let options = agent.options();
        let backoff = ExponentialBackoff::from(options);
        let hello = Box::pin(time::sleep(jittered(options.hello_period, options.hello_jitter)));
        let sweep = interval(options.sweep_period);
        let rate_update = interval(options.rate.period);
        let egress_cap = options.outbound_buffer.max(1);

        let mut driver = Self {
            agent,
            from_agent,
            state: ConnectionState::Inactive { backoff },
            conn_task: None,
            egress: VecDeque::with_capacity(egress_cap),
            egress_cap,
            next_seq: 0,
            hello,
            sweep,
            rate_update,
        };
        // first attempt goes out right away
        driver.try_connect();
        driver
    }

    /// Returns `true` while the controller connection is up.
    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Active { .. })
    }

    /// Returns `true` if the egress queue can take another outbox message.
    fn has_egress_room(&self) -> bool {
        self.egress.len() < self.egress_cap
    }

    fn try_connect(&mut self) {
        let addr = self.agent.options().controller;
        debug!(%addr, "connecting to controller");
        self.conn_task = Some(Box::pin(TcpStream::connect(addr)));
    }

    fn on_connected(&mut self, stream: TcpStream) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("failed to set TCP_NODELAY: {e}");
        }
        info!(controller = %self.agent.options().controller, "connected to controller");

        let conn = Framed::new(stream, Codec::starting_at(self.next_seq));
        self.state = ConnectionState::Active { conn };

        self.egress.clear();
        self.egress.extend(self.agent.status_messages());
        self.reset_hello();
    }

    /// Drops the connection. It is retried after the backoff.
    fn reset(&mut self) {
        if let ConnectionState::Active { conn } = &self.state {
            self.next_seq = conn.codec().next_seq();
        }
        self.state = ConnectionState::Inactive {
            backoff: ExponentialBackoff::from(self.agent.options()),
        };
        self.egress.clear();
        self.agent.inner.stats.increment_reconnects();
    }

    fn reset_hello(&mut self) {
        let options = self.agent.options();
        let next = jittered(options.hello_period, options.hello_jitter);
        self.hello.as_mut().reset(Instant::now() + next);
    }

    /// Polls the connection. Returns `Poll::Ready` whenever progress was made.
    fn poll_connection(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        if let Some(task) = self.conn_task.as_mut() {
            if let Poll::Ready(result) = task.poll_unpin(cx) {
                self.conn_task = None;
                match result {
                    Ok(stream) => self.on_connected(stream),
                    Err(e) => error!(controller = %self.agent.options().controller, "failed to connect: {e}"),
                }
                return Poll::Ready(());
            }
        }

        let conn = match &mut self.state {
            ConnectionState::Inactive { backoff } => {
                if self.conn_task.is_none() {
                    if let Poll::Ready(Some(waited)) = backoff.poll_next_unpin(cx) {
                        debug!(backoff = ?waited, retries = backoff.retry_count(), "retrying connection");
                        self.try_connect();
                        return Poll::Ready(());
                    }
                }
                return Poll::Pending;
            }
            ConnectionState::Active { conn } => conn,
        };

        if let Poll::Ready(Err(e)) = conn.poll_flush_unpin(cx) {
            error!("failed to flush controller connection: {e}");
            self.reset();
            return Poll::Ready(());
        }

        match conn.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(packet))) => {
                trace!(seq = packet.header.seq, kind = ?packet.message.msg_type(), "inbound");
                if let Err(e) = self.agent.handle(packet.message) {
                    debug!(seq = packet.header.seq, "control message failed: {e}");
                }
                return Poll::Ready(());
            }
            Poll::Ready(Some(Err(e))) => {
                error!("controller stream desynchronized: {e}");
                self.reset();
                return Poll::Ready(());
            }
            Poll::Ready(None) => {
                info!("controller closed the connection");
                self.reset();
                return Poll::Ready(());
            }
            Poll::Pending => {}
        }

        if !self.egress.is_empty() && conn.poll_ready_unpin(cx).is_ready() {
            if let Some(msg) = self.egress.pop_front() {
                let kind = msg.msg_type();
                if let Err(e) = conn.start_send_unpin(msg) {
                    // only unencodable messages end up here, the stream itself is fine
                    error!(?kind, "failed to send message: {e}");
                }
                return Poll::Ready(());
            }
        }

        Poll::Pending
    }
}

impl Future for AgentDriver {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        loop {
            if this.sweep.poll_tick(cx).is_ready() {
                this.agent.sweep();
                continue;
            }

            if this.rate_update.poll_tick(cx).is_ready() {
                this.agent.update_rates();
                continue;
            }

            if this.hello.as_mut().poll(cx).is_ready() {
                this.reset_hello();
                if this.is_connected() {
                    if this.has_egress_room() {
                        this.egress.push_back(this.agent.hello());
                    } else {
                        debug!(queued = this.egress.len(), "egress full, skipping hello");
                        this.agent.inner.stats.increment_messages_dropped();
                    }
                }
                continue;
            }

            // a stalled connection leaves the outbox to fill up and drop
            let stalled = this.is_connected() && !this.has_egress_room();
            match if stalled { Poll::Pending } else { this.from_agent.poll_recv(cx) } {
                Poll::Ready(Some(msg)) => {
                    if this.is_connected() {
                        this.egress.push_back(msg);
                    } else {
                        trace!(kind = ?msg.msg_type(), "not connected, dropping message");
                    }
                    continue;
                }
                Poll::Ready(None) => {
                    debug!("outbox closed, shutting down driver");
                    return Poll::Ready(());
                }
                Poll::Pending => {}
            }

            if this.poll_connection(cx).is_ready() {
                continue;
            }

            return Poll::Pending;
        }
    }
}

fn interval(period: Duration) -> Interval {
    let period = period.max(Duration::from_millis(1));
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// `period` scaled by a random factor in `1 ± jitter`.
fn jittered(period: Duration, jitter: f64) -> Duration {
    let jitter = jitter.clamp(0.0, 0.5);
    let factor = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);
    period.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lvap_common::EtherAddress;
    use lvap_wire::{StationInfo, StationStatus};
    use tokio::{net::TcpListener, time::timeout};

    use super::*;
    use crate::{AgentOptions, GroupTable, NullSink};

    /// A status report of several kilobytes, so socket buffers fill quickly.
    fn bulky_status() -> Message {
        Message::StationStatus(StationStatus {
            wtp: EtherAddress::ZERO,
            info: StationInfo { ssids: vec!["x".repeat(32); 200], ..Default::default() },
        })
    }

    #[tokio::test]
    async fn stalled_controller_backs_up_into_outbox() {
        let _ = tracing_subscriber::fmt::try_init();

        const OUTBOX: usize = 4;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let options = AgentOptions::default()
            .controller(listener.local_addr().unwrap())
            .outbound_buffer(OUTBOX)
            .hello_period(Duration::from_secs(600));
        let (agent, outbox) = Agent::new(options, Arc::new(NullSink), Arc::new(GroupTable::default()));
        let mut driver = AgentDriver::new(agent.clone(), outbox);

        // accepted but never read from
        let _ = timeout(Duration::from_millis(50), &mut driver).await;
        let (_peer, _) = listener.accept().await.unwrap();
        let _ = timeout(Duration::from_millis(50), &mut driver).await;
        assert!(driver.is_connected());

        let message = bulky_status();
        for _ in 0..20_000 {
            // never more than the outbox holds between two polls of the driver
            for _ in 0..OUTBOX {
                agent.send(message.clone());
            }
            let _ = timeout(Duration::from_millis(1), &mut driver).await;
            assert!(driver.egress.len() <= OUTBOX, "egress grew to {}", driver.egress.len());

            if agent.stats().messages_dropped() > 0 {
                break;
            }
        }

        assert!(agent.stats().messages_dropped() > 0);
        assert!(driver.is_connected());
    }

    #[test]
    fn hello_jitter_stays_in_bounds() {
        let period = Duration::from_secs(5);
        for _ in 0..1000 {
            let d = jittered(period, 0.1);
            assert!(d > Duration::from_millis(4499) && d < Duration::from_millis(5501), "{d:?}");
        }
        assert_eq!(jittered(period, 0.0), period);
    }
}
