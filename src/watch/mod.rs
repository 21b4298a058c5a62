//! Subscriber fan-out for configuration changes
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   update_config() -> ConfigStore diff -> for each changed entry:
//!                                            push onto every matching OutboundQueue [non-blocking]
//!                                                       ↓
//! Connection writer:
//!   Subscription::next() -> serialize -> WebSocket frame
//! ```
//!
//! # Delivery guarantees
//!
//! - A new subscriber starts with the full matching snapshot.
//! - Per-subscriber queues coalesce by id: a slow consumer never stalls the
//!   writer or other subscribers and always ends up with the latest value.
//! - Removed ids produce no notification.

mod dispatcher;
mod outbound_queue;

pub use dispatcher::*;
pub use outbound_queue::*;
