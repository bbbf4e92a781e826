//! # Engine events
//!
//! The engine publishes an event whenever something happens that other parts of the system may want to react to:
//! a deposit lands in a custodial account, an outbound transfer is confirmed or fails, an order is settled, or a
//! deposit cannot be reconciled against its order.
//!
//! Subscribers register callbacks in [`EventHooks`]. [`EventHandlers`] turns the hooks into channels and hands out
//! [`EventProducers`] that the engine APIs publish through.
mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};
