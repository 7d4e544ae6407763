//! # gcodesend core
//!
//! Core types shared by every gcodesend crate: the error taxonomy, machine
//! positions and units, controller and communicator state, and the scoped
//! listener registry.

pub mod core;
pub mod data;
pub mod error;

pub use core::{ListenerRegistry, Subscription, SubscriptionId};

pub use data::{
    Axis, CommunicatorState, ControllerStatus, PartialPosition, Position, StatusReport, Units,
};

pub use error::{
    CapacityViolation, ConnectionError, ControllerError, Error, GcodeError, ProtocolError, Result,
    StreamError,
};
