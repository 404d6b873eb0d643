//! Camera pose ingest.
//!
//! The vision coprocessor publishes `position` (x, y, z) and `rotation`
//! (roll, yaw, pitch in degrees) topics plus a `detection` quad for game
//! pieces. Each tick the newest frame is validated and, if its position moved,
//! kept as the latest [`VisionMeasurement`].

use alloc::{string::String, sync::Arc};

use embassy_time::Instant;
use serde::{Deserialize, Serialize};

use super::{Resource, Subsystem};
use crate::utils::{
    connection::TopicBus,
    estimation::VisionMeasurement,
    math::geometry::{Pose2d, Rotation2d, Translation2d},
};

#[derive(Debug, Clone, PartialEq)]
pub enum SampleError {
    WrongLength { position: usize, rotation: usize },
    NonFinite,
    /// Stamped no later than the measurement already held.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub position_topic: String,
    pub rotation_topic: String,
    pub detection_topic: String,
    /// On target for balancing when x is below `balance_min_x` or above `balance_max_x`
    pub balance_min_x: f32,
    pub balance_max_x: f32,
    pub too_far_min_x: f32,
    pub too_far_max_x: f32,
    /// Too close while x lies strictly inside this window
    pub too_close_min_x: f32,
    pub too_close_max_x: f32,
    /// Detection pixel → metre maps: `y = slope * px + offset`
    pub cube_y_slope: f32,
    pub cube_y_offset: f32,
    pub cube_x_slope: f32,
    pub cube_x_offset: f32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            position_topic: String::from("position"),
            rotation_topic: String::from("rotation"),
            detection_topic: String::from("detection"),
            balance_min_x: 3.99,
            balance_max_x: 12.71,
            too_far_min_x: 3.7,
            too_far_max_x: 12.9,
            too_close_min_x: 3.4,
            too_close_max_x: 13.2,
            cube_y_slope: 0.0023,
            cube_y_offset: -0.6187,
            cube_x_slope: -0.0058,
            cube_x_offset: 2.782,
        }
    }
}

pub struct Vision {
    bus: Arc<TopicBus>,
    config: VisionConfig,
    latest: Option<VisionMeasurement>,
    z_rotate: f32,
    last_frame: Option<Instant>,
}

impl Vision {
    pub fn new(
        bus: Arc<TopicBus>,
        config: &VisionConfig,
    ) -> Self {
        Self {
            bus,
            config: config.clone(),
            latest: None,
            z_rotate: 0.0,
            last_frame: None,
        }
    }

    /// Validate one frame. Returns `Ok(true)` when it becomes the latest
    /// measurement, `Ok(false)` when its position repeats the previous one.
    /// Accepted timestamps never decrease.
    pub fn ingest(
        &mut self,
        position: &[f32],
        rotation: &[f32],
        timestamp: Instant,
    ) -> Result<bool, SampleError> {
        if position.len() != 3 || rotation.len() != 3 {
            return Err(SampleError::WrongLength {
                position: position.len(),
                rotation: rotation.len(),
            });
        }
        if !position.iter().chain(rotation).all(|v| v.is_finite()) {
            return Err(SampleError::NonFinite);
        }
        if self.latest.is_some_and(|m| timestamp <= m.timestamp) {
            return Err(SampleError::Stale);
        }
        let pose = Pose2d::new(position[0], position[1], Rotation2d::from_degrees(rotation[1]));
        if self
            .latest
            .is_some_and(|m| m.pose.x() == pose.x() && m.pose.y() == pose.y())
        {
            return Ok(false);
        }
        self.latest = Some(VisionMeasurement { pose, timestamp });
        self.z_rotate = rotation[0];
        Ok(true)
    }

    pub fn latest_measurement(&self) -> Option<VisionMeasurement> {
        self.latest
    }

    pub fn has_measurement(&self) -> bool {
        self.latest.is_some()
    }

    /// Camera roll captured with the latest accepted frame (degrees).
    pub fn z_rotate(&self) -> f32 {
        self.z_rotate
    }

    /// Far enough from the grid to start balancing. True until a frame arrives.
    pub fn on_target_balance(&self) -> bool {
        self.latest.map_or(true, |m| {
            m.pose.x() < self.config.balance_min_x || m.pose.x() > self.config.balance_max_x
        })
    }

    pub fn too_far(&self) -> bool {
        self.latest.is_some_and(|m| {
            m.pose.x() < self.config.too_far_min_x || m.pose.x() > self.config.too_far_max_x
        })
    }

    pub fn too_close(&self) -> bool {
        self.latest.is_some_and(|m| {
            m.pose.x() > self.config.too_close_min_x && m.pose.x() < self.config.too_close_max_x
        })
    }

    /// Game piece position relative to the camera, from the detection quad.
    pub fn cube_position(&self) -> Option<Translation2d> {
        let sample = self.bus.latest(&self.config.detection_topic)?;
        match sample.values.as_slice() {
            [_, _, px, py] if px.is_finite() && py.is_finite() => Some(Translation2d::new(
                self.config.cube_x_slope * py + self.config.cube_x_offset,
                self.config.cube_y_slope * px + self.config.cube_y_offset,
            )),
            _ => None,
        }
    }
}

impl Subsystem for Vision {
    fn resource(&self) -> Option<Resource> {
        None
    }

    fn periodic(
        &mut self,
        _now: Instant,
    ) {
        let Some(position) = self.bus.latest(&self.config.position_topic) else {
            return;
        };
        if self.last_frame == Some(position.timestamp) {
            return;
        }
        self.last_frame = Some(position.timestamp);
        let rotation = self
            .bus
            .latest(&self.config.rotation_topic)
            .map(|s| s.values)
            .unwrap_or_default();
        match self.ingest(&position.values, &rotation, position.timestamp) {
            Ok(true) => tracing::trace!(measurement = ?self.latest, "Vision frame accepted"),
            Ok(false) => tracing::trace!("Duplicate vision frame"),
            Err(SampleError::Stale) => tracing::trace!(timestamp = ?position.timestamp, "Stale vision frame"),
            Err(error) => tracing::warn!(?error, "Vision frame discarded"),
        }
    }
}
