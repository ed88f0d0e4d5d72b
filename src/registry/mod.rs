//! # Registry
//!
//! Startup-built lookup tables for pluggable behaviors.

pub mod action_registry;

pub use action_registry::{
    ActionRegistry, StepAction, StepActionContext, StepActionError,
};
