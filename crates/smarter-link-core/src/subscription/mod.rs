//! Expiring HTTP callback subscriptions.
//!
//! Each device owns one [`SubscriptionRegistry`]. Status changes and faults
//! reported by the device session are pushed to every live subscriber as a
//! JSON POST; delivery is best-effort and never blocks the session.

pub mod headers;
pub mod registry;

pub use headers::{parse_callback_header, parse_timeout_header};
pub use registry::{Notification, Subscription, SubscriptionRegistry, SID_HEADER};
