//! # Host Bridge Traits
//!
//! Collaborator contracts the persistence core consumes but does not own.
//!
//! ## Traits
//!
//! - [`Clock`](time::Clock) - UTC time source for audit stamping
//! - [`PrincipalResolver`](identity::PrincipalResolver) - Who is performing the write
//! - [`NotificationSink`](notification::NotificationSink) - Where save outcomes are reported
//!
//! Each trait ships a production implementation (`SystemClock`,
//! `ProcessPrincipal`, `ConsoleSink`) and, where tests need determinism, a
//! controllable one (`ManualClock`, `StaticPrincipal`).
//!
//! ## Error Handling
//!
//! Bridge implementations convert host failures into
//! [`BridgeError`](error::BridgeError).

pub mod error;
pub mod identity;
pub mod notification;
pub mod time;

pub use error::BridgeError;

pub use identity::{PrincipalResolver, ProcessPrincipal, StaticPrincipal};
pub use notification::{ConsoleSink, LogEntry, LogLevel, NotificationSink};
pub use time::{Clock, ManualClock, SystemClock};
