//! Delay-compensated fusion of wheel odometry with vision poses.
//!
//! Every tick [`PoseEstimator::predict`] integrates odometry and records the
//! result in a short history. A vision pose is captured some time before it is
//! delivered, so [`PoseEstimator::correct`] looks up the odometry pose at the
//! capture time, nudges it toward the vision pose by a fixed gain and replays
//! the odometry recorded since. Heading is never taken from vision.
//!
//! # Example
//! ```rust
//! use embassy_time::Instant;
//! use swb_core::utils::estimation::{EstimatorConfig, PoseEstimator, VisionMeasurement};
//! use swb_core::utils::math::geometry::{Pose2d, Rotation2d, Translation2d};
//! use swb_core::utils::math::kinematics::{ModulePosition, SwerveKinematics};
//! let kin = SwerveKinematics::new([Translation2d::new(0.3, 0.3), Translation2d::new(-0.3, -0.3)]);
//! let mut est = PoseEstimator::new(kin, Rotation2d::ZERO, [ModulePosition::default(); 2], Pose2d::default(), &EstimatorConfig::default());
//! let t0 = Instant::from_millis(0);
//! est.predict(t0, Rotation2d::ZERO, [ModulePosition::default(); 2]);
//! let vision = VisionMeasurement { pose: Pose2d::new(5.0, 2.0, Rotation2d::from_degrees(90.0)), timestamp: t0 };
//! assert!(est.correct(vision));
//! assert_eq!(est.pose().translation, Translation2d::new(5.0, 2.0));
//! assert_eq!(est.pose().rotation, Rotation2d::ZERO);
//! ```

use alloc::vec::Vec;

use embassy_time::{Duration, Instant};
use heapless::Deque;
use serde::{Deserialize, Serialize};

use super::{odometry::SwerveOdometry, VisionMeasurement};
use crate::utils::math::{
    from_secs,
    geometry::{Pose2d, Rotation2d, Translation2d, Twist2d},
    kinematics::{ModulePosition, SwerveKinematics},
};

/// Upper bound on buffered ticks; at 20 ms this covers 2.56 s.
const HISTORY_CAPACITY: usize = 128;

/// Noise model for the fusion, as standard deviations on (x, y, heading).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub state_std_devs: [f32; 3],
    pub vision_std_devs: [f32; 3],
    /// How far back (s) a vision capture may reach into the odometry history
    pub history_secs: f32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            state_std_devs: [0.1, 0.1, 0.1],
            vision_std_devs: [0.9, 0.9, 0.9],
            history_secs: 1.5,
        }
    }
}

impl EstimatorConfig {
    /// Per-axis steady-state Kalman gain `q / (q + sqrt(q * r))`.
    pub fn vision_gains(&self) -> [f32; 3] {
        core::array::from_fn(|i| {
            let q = self.state_std_devs[i] * self.state_std_devs[i];
            let r = self.vision_std_devs[i] * self.vision_std_devs[i];
            if q == 0.0 {
                0.0
            } else {
                q / (q + libm::sqrtf(q * r))
            }
        })
    }

    /// Seconds of history the buffer actually holds when predicting every
    /// `tick_secs`; less than `history_secs` once the buffer is full.
    pub fn effective_history_secs(
        &self,
        tick_secs: f32,
    ) -> f32 {
        if tick_secs > 0.0 {
            self.history_secs.min(HISTORY_CAPACITY as f32 * tick_secs)
        } else {
            self.history_secs
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct InterpolationRecord<const N: usize> {
    timestamp: Instant,
    pose: Pose2d,
    gyro: Rotation2d,
    positions: [ModulePosition; N],
}

impl<const N: usize> InterpolationRecord<N> {
    fn interpolate(
        &self,
        end: &InterpolationRecord<N>,
        timestamp: Instant,
    ) -> InterpolationRecord<N> {
        let span = end.timestamp.as_micros().saturating_sub(self.timestamp.as_micros());
        let t = if span == 0 {
            1.0
        } else {
            timestamp.as_micros().saturating_sub(self.timestamp.as_micros()) as f32 / span as f32
        };
        InterpolationRecord {
            timestamp,
            pose: self.pose.interpolate(&end.pose, t),
            gyro: self.gyro.interpolate(end.gyro, t),
            positions: core::array::from_fn(|i| self.positions[i].interpolate(&end.positions[i], t)),
        }
    }
}

/// Fuses odometry with asynchronous vision into the authoritative robot pose.
pub struct PoseEstimator<const N: usize> {
    odometry: SwerveOdometry<N>,
    gains: [f32; 3],
    history_window: Duration,
    history: Deque<InterpolationRecord<N>, HISTORY_CAPACITY>,
    last_vision: Option<Instant>,
}

impl<const N: usize> PoseEstimator<N> {
    pub fn new(
        kinematics: SwerveKinematics<N>,
        gyro: Rotation2d,
        positions: [ModulePosition; N],
        initial_pose: Pose2d,
        config: &EstimatorConfig,
    ) -> Self {
        Self {
            odometry: SwerveOdometry::new(kinematics, gyro, positions, initial_pose),
            gains: config.vision_gains(),
            history_window: from_secs(config.history_secs),
            history: Deque::new(),
            last_vision: None,
        }
    }

    pub fn kinematics(&self) -> &SwerveKinematics<N> {
        self.odometry.kinematics()
    }

    /// Latest fused estimate.
    pub fn pose(&self) -> Pose2d {
        self.odometry.pose()
    }

    /// Capture time of the last accepted vision pose.
    pub fn last_vision_timestamp(&self) -> Option<Instant> {
        self.last_vision
    }

    /// Re-anchor at `pose` and forget the history. Vision bookkeeping is kept so
    /// stale frames stay rejected.
    pub fn reset_pose(
        &mut self,
        gyro: Rotation2d,
        positions: [ModulePosition; N],
        pose: Pose2d,
    ) {
        tracing::info!(?pose, "Odometry reset");
        self.odometry.reset_position(gyro, positions, pose);
        self.history.clear();
    }

    /// Integrate one tick of odometry at time `now`.
    pub fn predict(
        &mut self,
        now: Instant,
        gyro: Rotation2d,
        positions: [ModulePosition; N],
    ) -> Pose2d {
        let pose = self.odometry.update(gyro, positions);

        while let Some(front) = self.history.front() {
            let stale = now
                .checked_duration_since(front.timestamp)
                .is_some_and(|age| age > self.history_window);
            if stale || self.history.is_full() {
                self.history.pop_front();
            } else {
                break;
            }
        }
        while self.history.back().is_some_and(|r| r.timestamp >= now) {
            self.history.pop_back();
        }
        let _ = self.history.push_back(InterpolationRecord {
            timestamp: now,
            pose,
            gyro,
            positions,
        });
        pose
    }

    /// Blend a vision pose into the estimate. Returns `false` when the sample was
    /// dropped: non-finite, not newer than the last accepted one, or older than
    /// the buffered history.
    pub fn correct(
        &mut self,
        measurement: VisionMeasurement,
    ) -> bool {
        if !measurement.pose.is_finite() {
            tracing::trace!(?measurement, "Vision pose not finite");
            return false;
        }
        let Some(last) = self.last_vision else {
            let translation = measurement.pose.translation;
            tracing::info!(?translation, "First vision pose, snapping odometry");
            self.snap_translation(translation);
            self.last_vision = Some(measurement.timestamp);
            return true;
        };
        if measurement.timestamp <= last {
            tracing::trace!(?measurement, "Stale vision pose");
            return false;
        }

        let Some(sample) = self.sample_at(measurement.timestamp) else {
            tracing::trace!(?measurement, "Vision pose outside history");
            return false;
        };

        // Correct translation only; the gyro owns heading.
        let target = measurement.pose.with_rotation(sample.pose.rotation);
        let twist = sample.pose.log(&target);
        let scaled = Twist2d::new(
            twist.dx * self.gains[0],
            twist.dy * self.gains[1],
            twist.dtheta * self.gains[2],
        );
        let corrected = sample.pose.exp(scaled);

        let mut replay = Vec::new();
        while let Some(record) = self.history.pop_back() {
            if record.timestamp <= sample.timestamp {
                if record.timestamp < sample.timestamp {
                    let _ = self.history.push_back(record);
                }
                break;
            }
            replay.push(record);
        }

        self.odometry
            .reset_position(sample.gyro, sample.positions, corrected);
        let _ = self.history.push_back(InterpolationRecord {
            pose: corrected,
            ..sample
        });
        for record in replay.into_iter().rev() {
            let pose = self.odometry.update(record.gyro, record.positions);
            let _ = self.history.push_back(InterpolationRecord { pose, ..record });
        }

        self.last_vision = Some(measurement.timestamp);
        true
    }

    fn snap_translation(
        &mut self,
        translation: Translation2d,
    ) {
        self.odometry.reset_translation(translation);
        let latest = self.history.back().copied();
        self.history.clear();
        if let Some(latest) = latest {
            let _ = self.history.push_back(InterpolationRecord {
                pose: self.odometry.pose(),
                ..latest
            });
        }
    }

    fn sample_at(
        &self,
        timestamp: Instant,
    ) -> Option<InterpolationRecord<N>> {
        let newest = *self.history.back()?;
        let oldest = *self.history.front()?;
        if newest
            .timestamp
            .checked_duration_since(timestamp)
            .is_some_and(|age| age > self.history_window)
        {
            return None;
        }
        if timestamp <= oldest.timestamp {
            return Some(InterpolationRecord { timestamp, ..oldest });
        }
        if timestamp >= newest.timestamp {
            return Some(InterpolationRecord { timestamp, ..newest });
        }
        let mut prev = oldest;
        for record in self.history.iter() {
            if record.timestamp >= timestamp {
                return Some(prev.interpolate(record, timestamp));
            }
            prev = *record;
        }
        Some(InterpolationRecord { timestamp, ..newest })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::math::geometry::Translation2d;
    use embassy_time::Duration;

    fn kinematics() -> SwerveKinematics<4> {
        SwerveKinematics::new([
            Translation2d::new(0.3, 0.3),
            Translation2d::new(0.3, -0.3),
            Translation2d::new(-0.3, 0.3),
            Translation2d::new(-0.3, -0.3),
        ])
    }

    fn estimator() -> PoseEstimator<4> {
        PoseEstimator::new(
            kinematics(),
            Rotation2d::ZERO,
            [ModulePosition::default(); 4],
            Pose2d::default(),
            &EstimatorConfig::default(),
        )
    }

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    fn forward(distance: f32) -> [ModulePosition; 4] {
        [ModulePosition::new(distance, Rotation2d::ZERO); 4]
    }

    fn vision(
        x: f32,
        y: f32,
        ms: u64,
    ) -> VisionMeasurement {
        VisionMeasurement {
            pose: Pose2d::new(x, y, Rotation2d::from_degrees(45.0)),
            timestamp: at(ms),
        }
    }

    #[test]
    fn gain_matches_configured_noise() {
        let gains = EstimatorConfig::default().vision_gains();
        for k in gains {
            assert!((k - 0.1).abs() < 1e-5);
        }
    }

    #[test]
    fn without_vision_matches_dead_reckoning() {
        let mut est = estimator();
        let mut odom = SwerveOdometry::new(kinematics(), Rotation2d::ZERO, forward(0.0), Pose2d::default());
        for tick in 1..=50u64 {
            let gyro = Rotation2d::from_degrees(tick as f32 * 0.7);
            let positions: [ModulePosition; 4] = core::array::from_fn(|i| {
                ModulePosition::new(tick as f32 * 0.03 * (i + 1) as f32, Rotation2d::from_degrees(tick as f32))
            });
            let fused = est.predict(at(tick * 20), gyro, positions);
            let reckoned = odom.update(gyro, positions);
            assert_eq!(fused, reckoned);
        }
    }

    #[test]
    fn first_vision_snaps_translation_only() {
        let mut est = estimator();
        est.predict(at(0), Rotation2d::from_degrees(30.0), forward(0.0));
        assert!(est.correct(vision(4.0, 2.0, 0)));
        let pose = est.pose();
        assert_eq!(pose.translation, Translation2d::new(4.0, 2.0));
        assert!((pose.rotation.degrees() - 30.0).abs() < 1e-3);
        assert_eq!(est.last_vision_timestamp(), Some(at(0)));
    }

    #[test]
    fn stale_or_duplicate_vision_leaves_pose() {
        let mut est = estimator();
        est.predict(at(0), Rotation2d::ZERO, forward(0.0));
        assert!(est.correct(vision(1.0, 1.0, 100)));
        for tick in 1..=10u64 {
            est.predict(at(tick * 20), Rotation2d::ZERO, forward(0.0));
        }
        let before = est.pose();
        assert!(!est.correct(vision(3.0, 3.0, 100)));
        assert!(!est.correct(vision(3.0, 3.0, 60)));
        assert_eq!(est.pose(), before);
    }

    #[test]
    fn later_vision_blends_by_gain() {
        let mut est = estimator();
        est.predict(at(0), Rotation2d::ZERO, forward(0.0));
        assert!(est.correct(vision(1.0, 0.0, 0)));
        for tick in 1..=10u64 {
            est.predict(at(tick * 20), Rotation2d::ZERO, forward(0.0));
        }
        assert!(est.correct(vision(2.0, 0.0, 100)));
        let pose = est.pose();
        assert!((pose.x() - 1.1).abs() < 1e-4);
        assert!(pose.y().abs() < 1e-5);
        assert!(pose.rotation.radians().abs() < 1e-6);
    }

    #[test]
    fn correction_replays_later_odometry() {
        let mut est = estimator();
        est.predict(at(0), Rotation2d::ZERO, forward(0.0));
        assert!(est.correct(vision(0.0, 0.0, 0)));
        for tick in 1..=10u64 {
            est.predict(at(tick * 20), Rotation2d::ZERO, forward(tick as f32 * 0.02));
        }
        assert!((est.pose().x() - 0.2).abs() < 1e-5);

        // Odometry said 0.1 at 100 ms; vision says 1.1, so the capture pose moves by 0.1.
        assert!(est.correct(vision(1.1, 0.0, 100)));
        assert!((est.pose().x() - 0.3).abs() < 1e-4);

        let pose = est.predict(at(220), Rotation2d::ZERO, forward(0.22));
        assert!((pose.x() - 0.32).abs() < 1e-4);
    }

    #[test]
    fn vision_older_than_history_is_dropped() {
        let mut est = estimator();
        est.predict(at(0), Rotation2d::ZERO, forward(0.0));
        assert!(est.correct(vision(0.0, 0.0, 0)));
        let mut now = at(0);
        while now < at(3000) {
            now += Duration::from_millis(20);
            est.predict(now, Rotation2d::ZERO, forward(0.0));
        }
        let before = est.pose();
        assert!(!est.correct(vision(5.0, 5.0, 1000)));
        assert_eq!(est.pose(), before);
        assert_eq!(est.last_vision_timestamp(), Some(at(0)));
    }

    #[test]
    fn history_window_is_capped_by_buffer() {
        let config = EstimatorConfig { history_secs: 5.0, ..Default::default() };
        assert!((config.effective_history_secs(0.02) - 2.56).abs() < 1e-4);
        assert_eq!(EstimatorConfig::default().effective_history_secs(0.02), 1.5);
    }

    #[test]
    fn nan_vision_is_dropped() {
        let mut est = estimator();
        est.predict(at(0), Rotation2d::ZERO, forward(0.0));
        assert!(!est.correct(vision(f32::NAN, 0.0, 10)));
        assert_eq!(est.last_vision_timestamp(), None);
        assert_eq!(est.pose(), Pose2d::default());
    }

    #[test]
    fn reset_pose_clears_history() {
        let mut est = estimator();
        est.predict(at(0), Rotation2d::ZERO, forward(0.0));
        est.reset_pose(Rotation2d::ZERO, forward(0.0), Pose2d::new(2.0, 7.0, Rotation2d::from_degrees(180.0)));
        let pose = est.predict(at(20), Rotation2d::ZERO, forward(0.5));
        assert!((pose.x() - 1.5).abs() < 1e-5);
        assert!((pose.y() - 7.0).abs() < 1e-5);
    }
}
