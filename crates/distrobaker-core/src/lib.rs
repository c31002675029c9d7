//! Event-driven pipeline that mirrors upstream build-system tagging events
//! into a downstream build system: a [`bus::MessageBus`] subscription is
//! classified ([`classifier`]) against a live [`config::ConfigStore`],
//! coalesced into batches ([`coalescer`]), and pushed through a
//! [`koji::BuildSystemClient`] by the [`orchestrator`]. [`daemon::Daemon`]
//! wires all of it together; [`oneshot`] offers the same pipeline without
//! the bus, for manual catch-up runs.

pub mod awaited;
pub mod bus;
pub mod classifier;
pub mod coalescer;
pub mod config;
pub mod daemon;
pub mod error;
pub mod gitscm;
pub mod http;
pub mod koji;
pub mod module;
pub mod oneshot;
pub mod orchestrator;
pub mod reload;
pub mod scmurl;
pub mod session;
pub mod sidetag;
pub mod types;

pub use error::DaemonError;
