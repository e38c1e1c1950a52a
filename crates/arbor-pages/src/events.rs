//! Event primitives: the publish/subscribe bus and the keyed throttler.

pub mod bus;
pub mod throttle;

pub use bus::{Event, EventBus, EventCallback, OwnerLiveness, SubscribeOptions, SubscriptionId};
pub use throttle::EventThrottler;
