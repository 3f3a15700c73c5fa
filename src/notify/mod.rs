//! Push notification relay.
//!
//! A push builds a `NotificationDescriptor` and hands it to a
//! `NotificationSink`; clicks close it and, for the open action, open a window
//! at the application root.

mod descriptor;
mod relay;
mod sink;

pub use descriptor::NotificationDescriptor;
pub use relay::{ClickOutcome, NotificationRelay};
pub use sink::{ConsoleSink, NotificationSink};

#[cfg(test)]
pub use sink::testing;
