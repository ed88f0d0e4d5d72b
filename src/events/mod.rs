//! # Event System
//!
//! Broadcast channel publishing session, pool, and workflow lifecycle events
//! to any attached status consumer. Event names live in
//! [`crate::constants::events`].

pub mod publisher;

pub use publisher::{DirectorEvent, EventPublisher};
