//! Application Services
//!
//! Services that sit between the domain rules and the gateway adapter.
//!
//! - `SubscriptionRegistry`: active topic set and replay after reconnect
//! - `Dispatcher`: fan-out of normalized events to callbacks

pub mod dispatcher;
pub mod registry;

pub use dispatcher::{CallbackHandle, DispatchReport, Dispatcher};
pub use registry::{ReplayReport, SubscriptionRegistry};
