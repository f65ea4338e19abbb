pub mod connection;
pub mod dispatcher;
pub mod events;
pub mod limiter;
pub mod publisher;
pub mod registry;

pub use connection::{BusHandle, ConnectOptions, ConnectionManager};
pub use dispatcher::{Dispatcher, InboundEvent, ObserverId, SharedDispatcher};
pub use events::BusEvent;
pub use limiter::{RateLimiter, TopicRateLimiter};
pub use publisher::{Outbound, Publisher};
pub use registry::SubscriptionRegistry;
