//! Latest-value telemetry topics.
//!
//! Producers (another task, a network listener) publish `f32` arrays under a
//! topic name; the tick loop reads the most recent value of each topic. Only
//! the newest value is kept, there is no queue.
//!
//! # Example
//! ```rust
//! use embassy_time::Instant;
//! use swb_core::utils::connection::TopicBus;
//! let bus = TopicBus::new();
//! bus.apply_json(br#"{"topic":"position","value":[1.0,2.0,0.0],"ts_us":5000}"#, Instant::from_millis(0))
//!     .unwrap();
//! let sample = bus.latest("position").unwrap();
//! assert_eq!(sample.values, vec![1.0, 2.0, 0.0]);
//! assert_eq!(sample.timestamp, Instant::from_micros(5000));
//! ```

use alloc::{string::String, vec::Vec};
use core::cell::RefCell;

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use embassy_time::Instant;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub enum TopicError {
    Malformed(serde_json::Error),
    EmptyTopic,
}

impl core::fmt::Display for TopicError {
    fn fmt(
        &self,
        f: &mut core::fmt::Formatter<'_>,
    ) -> core::fmt::Result {
        match self {
            TopicError::Malformed(e) => write!(f, "malformed topic update: {}", e),
            TopicError::EmptyTopic => write!(f, "topic name is empty"),
        }
    }
}

/// Wire form of a single topic write.
///
/// Serialized as JSON: `{"topic": "position", "value": [x, y, z], "ts_us": 123}`.
/// Without `ts_us` the update is stamped with the time it was applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicUpdate {
    pub topic: String,
    pub value: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts_us: Option<u64>,
}

/// Most recent value of a topic and when it was published.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicSample {
    pub values: Vec<f32>,
    pub timestamp: Instant,
}

/// Thread-safe store of the latest value per topic.
pub struct TopicBus {
    topics: Mutex<CriticalSectionRawMutex, RefCell<HashMap<String, TopicSample>>>,
}

impl Default for TopicBus {
    fn default() -> Self {
        Self::new()
    }
}

impl TopicBus {
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(RefCell::new(HashMap::new())),
        }
    }

    /// Replace the value of `topic`.
    pub fn publish(
        &self,
        topic: &str,
        values: &[f32],
        timestamp: Instant,
    ) {
        self.topics.lock(|topics| {
            let mut topics = topics.borrow_mut();
            match topics.get_mut(topic) {
                Some(sample) => {
                    sample.values.clear();
                    sample.values.extend_from_slice(values);
                    sample.timestamp = timestamp;
                }
                None => {
                    topics.insert(
                        String::from(topic),
                        TopicSample {
                            values: values.to_vec(),
                            timestamp,
                        },
                    );
                }
            }
        });
    }

    pub fn latest(
        &self,
        topic: &str,
    ) -> Option<TopicSample> {
        self.topics.lock(|topics| topics.borrow().get(topic).cloned())
    }

    /// Decode a JSON [`TopicUpdate`] and publish it.
    pub fn apply_json(
        &self,
        payload: &[u8],
        now: Instant,
    ) -> Result<(), TopicError> {
        let update: TopicUpdate = serde_json::from_slice(payload).map_err(TopicError::Malformed)?;
        self.apply(update, now)
    }

    pub fn apply(
        &self,
        update: TopicUpdate,
        now: Instant,
    ) -> Result<(), TopicError> {
        if update.topic.is_empty() {
            return Err(TopicError::EmptyTopic);
        }
        let timestamp = update.ts_us.map_or(now, Instant::from_micros);
        tracing::trace!(topic = %update.topic, ?timestamp, "Topic update");
        self.publish(&update.topic, &update.value, timestamp);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_replaces_previous_value() {
        let bus = TopicBus::new();
        bus.publish("rotation", &[0.1, 0.2, 0.3], Instant::from_millis(1));
        bus.publish("rotation", &[0.4], Instant::from_millis(2));
        let sample = bus.latest("rotation").unwrap();
        assert_eq!(sample.values, alloc::vec![0.4]);
        assert_eq!(sample.timestamp, Instant::from_millis(2));
        assert!(bus.latest("position").is_none());
    }

    #[test]
    fn json_without_timestamp_uses_now() {
        let bus = TopicBus::new();
        bus.apply_json(br#"{"topic":"detection","value":[0,0,300,200]}"#, Instant::from_millis(40))
            .unwrap();
        let sample = bus.latest("detection").unwrap();
        assert_eq!(sample.values.len(), 4);
        assert_eq!(sample.timestamp, Instant::from_millis(40));
    }

    #[test]
    fn malformed_json_is_rejected() {
        let bus = TopicBus::new();
        assert!(matches!(
            bus.apply_json(b"{\"topic\":\"position\",\"value\":\"x\"}", Instant::from_millis(0)),
            Err(TopicError::Malformed(_))
        ));
        assert!(matches!(
            bus.apply_json(br#"{"topic":"","value":[1.0]}"#, Instant::from_millis(0)),
            Err(TopicError::EmptyTopic)
        ));
        assert!(bus.latest("position").is_none());
    }
}
