//! Listener plumbing shared by the communicator and its callers

pub mod listener;

pub use listener::{ListenerRegistry, Subscription, SubscriptionId};
