use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::scheduler::Admission;

/// Malformed-input warnings are logged on the first occurrence and then once
/// every `MALFORMED_LOG_EVERY` occurrences.
const MALFORMED_LOG_EVERY: usize = 1024;

/// Agent-wide counters. Shared between the packet path, the timers and the
/// controller connection.
#[derive(Debug, Default)]
pub struct AgentStats {
    /// Data bytes handed to the radio.
    bytes_tx: AtomicU64,
    /// Data bytes received from the radio.
    bytes_rx: AtomicU64,
    /// Control messages handled.
    messages_rx: AtomicUsize,
    /// Control messages queued for the controller.
    messages_tx: AtomicUsize,
    /// Control messages dropped because the outbound buffer was full.
    messages_dropped: AtomicUsize,
    malformed: AtomicUsize,
    unknown_types: AtomicUsize,
    unknown_entities: AtomicUsize,
    /// Frames refused by the admission gate, per verdict.
    unknown_station: AtomicUsize,
    wrong_radio: AtomicUsize,
    filtering_disabled: AtomicUsize,
    not_authenticated: AtomicUsize,
    not_associated: AtomicUsize,
    uplink_only: AtomicUsize,
    /// Frames dropped on a full sub-queue.
    queue_full: AtomicUsize,
    reconnects: AtomicUsize,
    verbose: AtomicBool,
}

impl AgentStats {
    #[inline]
    pub(crate) fn increment_tx(&self, bytes: usize) {
        self.bytes_tx.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_rx(&self, bytes: usize) {
        self.bytes_rx.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_messages_rx(&self) {
        self.messages_rx.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_messages_tx(&self) {
        self.messages_tx.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_messages_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a malformed unit and returns whether this occurrence should be logged.
    #[inline]
    pub(crate) fn increment_malformed(&self) -> bool {
        self.malformed.fetch_add(1, Ordering::Relaxed) % MALFORMED_LOG_EVERY == 0
    }

    /// Counts an unknown message type and returns whether it should be logged.
    #[inline]
    pub(crate) fn increment_unknown_types(&self) -> bool {
        self.unknown_types.fetch_add(1, Ordering::Relaxed) % MALFORMED_LOG_EVERY == 0
    }

    #[inline]
    pub(crate) fn increment_unknown_entities(&self) {
        self.unknown_entities.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_refused(&self, verdict: Admission) {
        let counter = match verdict {
            Admission::Admitted => return,
            Admission::UnknownStation => &self.unknown_station,
            Admission::WrongRadio => &self.wrong_radio,
            Admission::FilteringDisabled => &self.filtering_disabled,
            Admission::NotAuthenticated => &self.not_authenticated,
            Admission::NotAssociated => &self.not_associated,
            Admission::UplinkOnly => &self.uplink_only,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_queue_full(&self) {
        self.queue_full.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_reconnects(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Payload bytes sent to stations.
    #[inline]
    pub fn bytes_tx(&self) -> u64 {
        self.bytes_tx.load(Ordering::Relaxed)
    }

    /// Payload bytes received from stations.
    #[inline]
    pub fn bytes_rx(&self) -> u64 {
        self.bytes_rx.load(Ordering::Relaxed)
    }

    /// Messages received from the controller.
    #[inline]
    pub fn messages_rx(&self) -> usize {
        self.messages_rx.load(Ordering::Relaxed)
    }

    /// Messages queued for the controller.
    #[inline]
    pub fn messages_tx(&self) -> usize {
        self.messages_tx.load(Ordering::Relaxed)
    }

    /// Messages for the controller dropped on a full outbox.
    #[inline]
    pub fn messages_dropped(&self) -> usize {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    /// Messages whose body could not be decoded.
    #[inline]
    pub fn malformed(&self) -> usize {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Messages of an unknown type.
    #[inline]
    pub fn unknown_types(&self) -> usize {
        self.unknown_types.load(Ordering::Relaxed)
    }

    /// Messages referencing an unknown entity.
    #[inline]
    pub fn unknown_entities(&self) -> usize {
        self.unknown_entities.load(Ordering::Relaxed)
    }

    /// Frames refused by the admission gate with the given verdict.
    pub fn refused(&self, verdict: Admission) -> usize {
        match verdict {
            Admission::Admitted => 0,
            Admission::UnknownStation => self.unknown_station.load(Ordering::Relaxed),
            Admission::WrongRadio => self.wrong_radio.load(Ordering::Relaxed),
            Admission::FilteringDisabled => self.filtering_disabled.load(Ordering::Relaxed),
            Admission::NotAuthenticated => self.not_authenticated.load(Ordering::Relaxed),
            Admission::NotAssociated => self.not_associated.load(Ordering::Relaxed),
            Admission::UplinkOnly => self.uplink_only.load(Ordering::Relaxed),
        }
    }

    /// Frames dropped on a full sub-queue.
    #[inline]
    pub fn queue_full(&self) -> usize {
        self.queue_full.load(Ordering::Relaxed)
    }

    /// Controller connections lost.
    #[inline]
    pub fn reconnects(&self) -> usize {
        self.reconnects.load(Ordering::Relaxed)
    }

    /// Whether per-frame tracing is on.
    #[inline]
    pub fn verbose(&self) -> bool {
        self.verbose.load(Ordering::Relaxed)
    }

    /// Toggles per-frame trace output.
    pub fn set_verbose(&self, verbose: bool) {
        self.verbose.store(verbose, Ordering::Relaxed);
    }
}
