//! Inbound telemetry from off-board producers such as the vision coprocessor.
//!
//! - `topics`: named latest-value numeric topics shared between tasks

pub mod topics;

pub use topics::{TopicBus, TopicError, TopicSample, TopicUpdate};
