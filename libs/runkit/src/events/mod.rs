mod bus;
mod event;
pub(crate) mod observer;

pub use bus::{EventBus, EventCallback, SubscriptionId};
pub use event::{Event, EventKind};
