//! Swerve drivetrain: the drive control surface over `N` modules.
//!
//! Turns operator axes, fixed velocity requests or a trajectory into module
//! targets each tick, and keeps the fused field pose up to date from the
//! modules, the IMU and vision.
//!
//! # Example
//! ```rust,ignore
//! let mut drive = DriveTrain::new(modules, imu, locations, &DriveConfig::default(), &EstimatorConfig::default());
//! drive.periodic(now);
//! drive.joystick_drive(pilot.left_y, pilot.left_x, pilot.right_x, false);
//! ```

use alloc::{boxed::Box, rc::Rc};

use embassy_time::Instant;
use serde::{Deserialize, Serialize};

use super::{hardware::Imu, Owns, Resource, ResourceSet, Subsystem, SwerveModule};
use crate::utils::{
    command::{Command, Finish},
    estimation::{EstimatorConfig, PoseEstimator, VisionMeasurement},
    math::{
        elapsed,
        filters::{shape_axis, MovingAverage, SlewRateLimiter},
        geometry::{Pose2d, Rotation2d, Translation2d},
        kinematics::{desaturate_wheel_speeds, ChassisSpeeds, ModulePosition, SwerveKinematics},
        pid::PidGains,
        secs,
        trajectory::{Alliance, HolonomicController, Trajectory},
    },
};

const DRIVETRAIN: ResourceSet = ResourceSet::of(Resource::Drivetrain);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Physical cap on any single module's wheel speed (m/s)
    pub max_module_speed: f32,
    pub max_speed_x: f32,
    pub max_speed_y: f32,
    /// deg/s
    pub max_rotation: f32,
    /// m/s²
    pub translation_slew: f32,
    /// deg/s²
    pub rotation_slew: f32,
    pub deadband: f32,
    pub field_relative: bool,
    pub holonomic_pid: PidGains,
    pub rotation_pid: PidGains,
    /// Front-left, front-right, back-left, back-right (m)
    pub module_locations: [Translation2d; 4],
    pub tick_secs: f32,
    pub balance_fast: f32,
    pub balance_slow: f32,
    /// Filtered IMU tilt above which the robot is on the ramp
    pub tilt_threshold: f32,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            max_module_speed: 4.0,
            max_speed_x: 4.0,
            max_speed_y: 4.0,
            max_rotation: 360.0,
            translation_slew: 8.0,
            rotation_slew: 1440.0,
            deadband: 0.15,
            field_relative: false,
            holonomic_pid: PidGains::new(2.0, 0.0, 0.0),
            rotation_pid: PidGains::new(8.0, 0.0, 0.0),
            module_locations: [
                Translation2d::new(0.2794, 0.2794),
                Translation2d::new(0.2794, -0.2794),
                Translation2d::new(-0.2794, 0.2794),
                Translation2d::new(-0.2794, -0.2794),
            ],
            tick_secs: 0.02,
            balance_fast: 0.4,
            balance_slow: 0.2,
            tilt_threshold: 0.1,
        }
    }
}

/// Progress of the charge-station balance manoeuvre.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalancePhase {
    /// Driving toward the ramp until the chassis tilts.
    Approach,
    /// On the ramp, creeping until the chassis levels out.
    Climbing,
    Level,
}

struct PathFollower {
    trajectory: Trajectory,
    start: Instant,
}

pub struct DriveTrain<const N: usize> {
    modules: [Box<dyn SwerveModule>; N],
    imu: Box<dyn Imu>,
    estimator: PoseEstimator<N>,
    config: DriveConfig,
    x_limiter: SlewRateLimiter,
    y_limiter: SlewRateLimiter,
    rot_limiter: SlewRateLimiter,
    tilt: MovingAverage<10>,
    balance: BalancePhase,
    controller: HolonomicController,
    follower: Option<PathFollower>,
    last_angles: [Rotation2d; N],
    alliance: Alliance,
    now: Instant,
}

impl<const N: usize> DriveTrain<N> {
    pub fn new(
        modules: [Box<dyn SwerveModule>; N],
        imu: Box<dyn Imu>,
        locations: [Translation2d; N],
        config: &DriveConfig,
        estimator: &EstimatorConfig,
    ) -> Self {
        let positions: [ModulePosition; N] = core::array::from_fn(|i| modules[i].position());
        let last_angles = core::array::from_fn(|i| positions[i].angle);
        let history = estimator.effective_history_secs(config.tick_secs);
        if history < estimator.history_secs {
            tracing::warn!(
                requested = estimator.history_secs,
                history,
                "Vision history window exceeds the odometry buffer"
            );
        }
        let estimator = PoseEstimator::new(
            SwerveKinematics::new(locations),
            imu.heading(),
            positions,
            Pose2d::default(),
            estimator,
        );
        Self {
            modules,
            imu,
            estimator,
            x_limiter: SlewRateLimiter::new(config.translation_slew),
            y_limiter: SlewRateLimiter::new(config.translation_slew),
            rot_limiter: SlewRateLimiter::new(config.rotation_slew),
            tilt: MovingAverage::new(),
            balance: BalancePhase::Approach,
            controller: HolonomicController::new(config.holonomic_pid, config.rotation_pid, config.tick_secs),
            follower: None,
            last_angles,
            alliance: Alliance::Blue,
            now: Instant::from_ticks(0),
            config: config.clone(),
        }
    }

    pub fn pose(&self) -> Pose2d {
        self.estimator.pose()
    }

    pub fn heading(&self) -> Rotation2d {
        self.imu.heading()
    }

    pub fn estimator(&self) -> &PoseEstimator<N> {
        &self.estimator
    }

    pub fn alliance(&self) -> Alliance {
        self.alliance
    }

    pub fn set_alliance(
        &mut self,
        alliance: Alliance,
    ) {
        self.alliance = alliance;
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    pub fn module_positions(&self) -> [ModulePosition; N] {
        core::array::from_fn(|i| self.modules[i].position())
    }

    /// Feed the newest vision pose to the estimator. Repeats of an already
    /// accepted capture are dropped there.
    pub fn add_vision_measurement(
        &mut self,
        measurement: Option<VisionMeasurement>,
    ) {
        let Some(measurement) = measurement else {
            return;
        };
        if self.estimator.last_vision_timestamp() == Some(measurement.timestamp) {
            return;
        }
        if !self.estimator.correct(measurement) {
            tracing::trace!(?measurement, "Vision measurement not applied");
        }
    }

    /// Re-anchor odometry at `pose` using the current sensor readings.
    pub fn reset_pose(
        &mut self,
        pose: Pose2d,
    ) {
        let positions = self.module_positions();
        self.estimator.reset_pose(self.imu.heading(), positions, pose);
    }

    /// Drive at `x`, `y` (m/s) and `rotation` (deg/s).
    pub fn drive(
        &mut self,
        x: f32,
        y: f32,
        rotation: f32,
        field_relative: bool,
    ) {
        let omega = rotation.to_radians();
        let speeds = if field_relative {
            ChassisSpeeds::from_field_relative(x, y, omega, self.pose().rotation)
        } else {
            ChassisSpeeds::new(x, y, omega)
        };
        self.set_chassis_speeds(speeds);
    }

    /// Send robot-relative `speeds` to the modules. Modules asked for zero speed
    /// keep their previous steering angle.
    pub fn set_chassis_speeds(
        &mut self,
        speeds: ChassisSpeeds,
    ) {
        let mut states = self.estimator.kinematics().to_module_states(speeds);
        desaturate_wheel_speeds(&mut states, self.config.max_module_speed);
        for (i, state) in states.iter_mut().enumerate() {
            if state.speed == 0.0 {
                state.angle = self.last_angles[i];
            }
            self.last_angles[i] = state.angle;
            self.modules[i].set_desired_state(*state);
        }
    }

    pub fn stop(&mut self) {
        self.drive(0.0, 0.0, 0.0, false);
    }

    /// Operator axes in `[-1, 1]`: deadband, square-law curve, scale to the
    /// configured maxima, then slew-rate limit.
    pub fn joystick_drive(
        &mut self,
        x: f32,
        y: f32,
        rotation: f32,
        field_relative: bool,
    ) {
        let deadband = self.config.deadband;
        let x = self
            .x_limiter
            .calculate(shape_axis(x, deadband) * self.config.max_speed_x, self.now);
        let y = self
            .y_limiter
            .calculate(shape_axis(y, deadband) * self.config.max_speed_y, self.now);
        let rotation = self
            .rot_limiter
            .calculate(shape_axis(rotation, deadband) * self.config.max_rotation, self.now);
        self.drive(x, y, rotation, field_relative);
    }

    /// Filtered IMU tilt.
    pub fn tilt(&self) -> f32 {
        self.tilt.value()
    }

    /// Whether the chassis is tilted onto the ramp.
    pub fn in_angle(&self) -> bool {
        libm::fabsf(self.tilt.value()) > self.config.tilt_threshold
    }

    pub fn balance_phase(&self) -> BalancePhase {
        self.balance
    }

    pub fn begin_balance(&mut self) {
        self.balance = BalancePhase::Approach;
    }

    /// One tick of the balance manoeuvre. Returns `true` once level.
    pub fn balance_step(&mut self) -> bool {
        self.balance = match self.balance {
            BalancePhase::Approach if self.in_angle() => BalancePhase::Climbing,
            BalancePhase::Climbing if !self.in_angle() => BalancePhase::Level,
            phase => phase,
        };
        match self.balance {
            BalancePhase::Approach => self.drive(-self.config.balance_fast, 0.0, 0.0, true),
            BalancePhase::Climbing => self.drive(-self.config.balance_slow, 0.0, 0.0, true),
            BalancePhase::Level => self.stop(),
        }
        self.balance == BalancePhase::Level
    }

    /// Start tracking `trajectory`, mirrored for the current alliance. With
    /// `reset`, odometry jumps to the path's start pose first.
    pub fn begin_following(
        &mut self,
        trajectory: &Trajectory,
        reset: bool,
    ) {
        let trajectory = trajectory.transform_for_alliance(self.alliance);
        let initial = trajectory.initial_state();
        if reset {
            self.reset_pose(initial.pose.with_rotation(initial.holonomic_rotation));
        }
        tracing::info!(alliance = ?self.alliance, total = trajectory.total_time(), "Following path");
        self.controller.reset();
        self.follower = Some(PathFollower {
            trajectory,
            start: self.now,
        });
    }

    pub fn follow_step(&mut self) {
        let Some(follower) = &self.follower else {
            return;
        };
        let target = follower
            .trajectory
            .sample(secs(elapsed(self.now, follower.start)));
        let pose = self.pose();
        let speeds = self.controller.calculate(pose, &target);
        self.set_chassis_speeds(speeds);
    }

    pub fn following_finished(&self) -> bool {
        self.follower.as_ref().map_or(true, |f| {
            secs(elapsed(self.now, f.start)) >= f.trajectory.total_time()
        })
    }

    pub fn end_following(&mut self) {
        self.follower = None;
        self.stop();
    }

    /// Restart every slew limiter from rest.
    pub fn reset_limiters(&mut self) {
        let now = self.now;
        self.x_limiter.reset(0.0, now);
        self.y_limiter.reset(0.0, now);
        self.rot_limiter.reset(0.0, now);
    }

    /// Joystick drive; axes are read from the context each tick.
    pub fn joystick_command<C: Owns<Self> + 'static>(
        axes: impl Fn(&C) -> (f32, f32, f32) + 'static,
    ) -> Command<C> {
        Command::functional(
            "joystick_drive",
            DRIVETRAIN,
            |c: &mut C| c.subsystem_mut().reset_limiters(),
            move |c: &mut C| {
                let (x, y, rot) = axes(c);
                let drive = c.subsystem_mut();
                let field_relative = drive.config.field_relative;
                drive.joystick_drive(x, y, rot, field_relative);
            },
            |c: &mut C, _| c.subsystem_mut().stop(),
            Finish::Never,
        )
    }

    /// Drive at a fixed robot-relative velocity until interrupted.
    pub fn drive_with_speed<C: Owns<Self> + 'static>(
        x: f32,
        y: f32,
        rotation: f32,
    ) -> Command<C> {
        Command::functional(
            "drive_with_speed",
            DRIVETRAIN,
            |_| {},
            move |c: &mut C| c.subsystem_mut().drive(x, y, rotation, false),
            |c: &mut C, _| c.subsystem_mut().stop(),
            Finish::Never,
        )
    }

    /// Hold the modules at zero speed until interrupted.
    pub fn stop_command<C: Owns<Self> + 'static>() -> Command<C> {
        Command::run("stop", DRIVETRAIN, |c: &mut C| c.subsystem_mut().stop())
    }

    pub fn balance_command<C: Owns<Self> + 'static>() -> Command<C> {
        Command::functional(
            "balance",
            DRIVETRAIN,
            |c: &mut C| c.subsystem_mut().begin_balance(),
            |c: &mut C| {
                c.subsystem_mut().balance_step();
            },
            |c: &mut C, _| c.subsystem_mut().stop(),
            Finish::When(Box::new(|c: &C| {
                c.subsystem().balance_phase() == BalancePhase::Level
            })),
        )
    }

    pub fn follow_path<C: Owns<Self> + 'static>(
        trajectory: Rc<Trajectory>,
        reset: bool,
    ) -> Command<C> {
        Command::functional(
            "follow_path",
            DRIVETRAIN,
            move |c: &mut C| c.subsystem_mut().begin_following(&trajectory, reset),
            |c: &mut C| c.subsystem_mut().follow_step(),
            |c: &mut C, _| c.subsystem_mut().end_following(),
            Finish::When(Box::new(|c: &C| c.subsystem().following_finished())),
        )
    }

    pub fn reset_pose_command<C: Owns<Self> + 'static>(pose: Pose2d) -> Command<C> {
        Command::run_once("reset_pose", DRIVETRAIN, move |c: &mut C| {
            c.subsystem_mut().reset_pose(pose)
        })
    }
}

impl<const N: usize> Subsystem for DriveTrain<N> {
    fn resource(&self) -> Option<Resource> {
        Some(Resource::Drivetrain)
    }

    fn periodic(
        &mut self,
        now: Instant,
    ) {
        self.now = now;
        for module in self.modules.iter_mut() {
            module.periodic();
        }
        let positions = self.module_positions();
        self.estimator.predict(now, self.imu.heading(), positions);
        self.tilt.calculate(self.imu.accel_x());
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::utils::controllers::hardware::testing::{FakeImu, FakeModule};
    use crate::utils::math::trajectory::TrajectoryState;

    struct Rig {
        modules: [FakeModule; 4],
        imu: FakeImu,
        drive: DriveTrain<4>,
    }

    fn rig() -> Rig {
        let modules: [FakeModule; 4] = Default::default();
        let imu = FakeImu::default();
        let config = DriveConfig::default();
        let boxed: [Box<dyn SwerveModule>; 4] = core::array::from_fn(|i| Box::new(modules[i].clone()) as Box<dyn SwerveModule>);
        let drive = DriveTrain::new(
            boxed,
            Box::new(imu.clone()),
            config.module_locations,
            &config,
            &EstimatorConfig::default(),
        );
        Rig { modules, imu, drive }
    }

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn equal_forward_distances_move_the_pose_forward() {
        let mut rig = rig();
        rig.drive.periodic(at(0));
        for m in &rig.modules {
            m.distance.set(1.0);
        }
        rig.drive.periodic(at(20));
        let pose = rig.drive.pose();
        assert!((pose.x() - 1.0).abs() < 1e-5);
        assert!(pose.y().abs() < 1e-5);
        assert!(pose.rotation.radians().abs() < 1e-5);
    }

    #[test]
    fn zero_request_keeps_steering_angle() {
        let mut rig = rig();
        rig.drive.drive(0.0, 1.0, 0.0, false);
        for m in &rig.modules {
            assert!((m.target.get().angle.degrees() - 90.0).abs() < 1e-3);
        }
        rig.drive.stop();
        for m in &rig.modules {
            assert_eq!(m.target.get().speed, 0.0);
            assert!((m.target.get().angle.degrees() - 90.0).abs() < 1e-3);
        }
    }

    #[test]
    fn module_speeds_never_exceed_the_cap() {
        let mut rig = rig();
        rig.drive.drive(4.0, 0.0, 360.0, false);
        let speeds: vec::Vec<f32> = rig.modules.iter().map(|m| libm::fabsf(m.target.get().speed)).collect();
        let max = speeds.iter().cloned().fold(0.0, f32::max);
        assert!((max - 4.0).abs() < 1e-4);
    }

    #[test]
    fn joystick_input_is_shaped_and_slew_limited() {
        let mut rig = rig();
        rig.drive.periodic(at(0));
        rig.drive.reset_limiters();

        rig.drive.periodic(at(20));
        rig.drive.joystick_drive(0.1, 0.0, 0.0, false);
        assert_eq!(rig.modules[0].target.get().speed, 0.0);

        rig.drive.periodic(at(40));
        rig.drive.joystick_drive(1.0, 0.0, 0.0, false);
        // 8 m/s² over the 20 ms since the previous call
        for m in &rig.modules {
            assert!((m.target.get().speed - 0.16).abs() < 1e-4);
        }
    }

    #[test]
    fn balance_walks_through_its_phases() {
        let mut rig = rig();
        rig.drive.periodic(at(0));
        rig.drive.begin_balance();
        assert!(!rig.drive.balance_step());
        assert_eq!(rig.drive.balance_phase(), BalancePhase::Approach);
        assert!((rig.modules[0].target.get().speed.abs() - 0.4).abs() < 1e-4);

        rig.imu.accel_x.set(0.5);
        rig.drive.periodic(at(20));
        rig.drive.balance_step();
        assert_eq!(rig.drive.balance_phase(), BalancePhase::Climbing);
        assert!((rig.modules[0].target.get().speed.abs() - 0.2).abs() < 1e-4);

        rig.imu.accel_x.set(0.0);
        for n in 2..=12 {
            rig.drive.periodic(at(n * 20));
        }
        assert!(rig.drive.balance_step());
        assert_eq!(rig.modules[0].target.get().speed, 0.0);
    }

    #[test]
    fn following_resets_to_mirrored_start_on_red() {
        let mut rig = rig();
        rig.drive.set_alliance(Alliance::Red);
        let start = Pose2d::new(2.0, 1.0, Rotation2d::ZERO);
        let end = Pose2d::new(4.0, 1.0, Rotation2d::ZERO);
        let path = Trajectory::new(vec![TrajectoryState::at(0.0, start, 0.0), TrajectoryState::at(1.0, end, 0.0)]).unwrap();

        rig.drive.periodic(at(0));
        rig.drive.begin_following(&path, true);
        let pose = rig.drive.pose();
        assert!((pose.x() - 2.0).abs() < 1e-5);
        assert!((pose.y() - (8.02 - 1.0)).abs() < 1e-5);
        assert!(!rig.drive.following_finished());

        rig.drive.periodic(at(500));
        rig.drive.follow_step();
        assert!(rig.modules[0].target.get().speed > 0.0);

        rig.drive.periodic(at(1000));
        assert!(rig.drive.following_finished());
        rig.drive.end_following();
        assert_eq!(rig.modules[0].target.get().speed, 0.0);
    }
}
