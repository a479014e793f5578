//! Access point side of a split-MAC WiFi control plane.
//!
//! The [`Agent`] keeps the authoritative view of the stations and virtual
//! access points hosted on the local radios, answers the controller, schedules
//! outbound frames fairly across tenants, picks bitrates and evaluates
//! telemetry triggers. The controller connection itself is driven by an
//! [`AgentDriver`].

use std::io;

use thiserror::Error;

pub mod admin;

mod agent;
pub use agent::{Agent, AgentDriver, ExponentialBackoff};

pub mod frame;
pub use frame::{
    FrameSink, GroupMembership, GroupTable, NullSink, Outbound, RxFrame, Scheduled, Stage,
    TxFrame, TxStatus,
};

mod link;
pub use link::{LinkSnapshot, LinkStatsTracker};

mod options;
pub use options::{AgentOptions, RateOptions, SchedulerOptions};

pub mod rate;
pub use rate::{Rate, RateController, RateSet};

pub mod registry;
pub use registry::{Registry, RegistryError, Station, TxPolicy, Upsert, Vap};

pub mod scheduler;
pub use scheduler::{Admission, Classifier, QueueFull, RuleKey, Scheduler};

mod stats;
pub use stats::AgentStats;

pub mod trigger;
pub use trigger::{Trigger, TriggerEngine};

/// Outcome of registering something that may already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new entry was registered.
    Created,
    /// The existing entry was updated in place.
    Updated,
    /// An identical trigger was already registered under the given id and has
    /// been re-armed instead.
    Rearmed(u32),
}

/// Errors returned while handling controller messages.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The message could not be decoded.
    #[error("wire error: {0}")]
    Wire(#[from] lvap_wire::Error),
    /// The message referenced an unknown entity.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Socket failure.
    #[error("IO error: {0:?}")]
    Io(#[from] io::Error),
    /// No trigger with this id is registered.
    #[error("unknown trigger {0}")]
    UnknownTrigger(u32),
    /// An agent-to-controller message arrived from the controller.
    #[error("unexpected {0:?} from the controller")]
    Unexpected(lvap_wire::MsgType),
}
