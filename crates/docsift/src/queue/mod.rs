//! Ordered work queue with priority and status tracking

mod manager;

pub use manager::{QueueEvent, QueueManager};
