//! Event broadcaster
//!
//! A single-owner actor holding the set of live subscribers. Registration,
//! unregistration and publishing are all messages into one serial loop.
//!
//! ## Delivery
//! - Each publish spawns one delivery task per current subscriber; the loop
//!   never waits on them
//! - A delivery gives up after the configured timeout (slow consumer, event
//!   dropped for that subscriber only)
//! - A subscriber whose cancel signal fired is removed instead of delivered to

pub mod broadcaster;
pub mod subscriber;

pub use broadcaster::Broadcaster;
pub use subscriber::{Delivery, Subscriber};
