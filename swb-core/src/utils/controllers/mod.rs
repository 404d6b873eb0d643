//! Subsystems that own robot hardware.
//!
//! - `hardware`: traits for modules, IMU and motors supplied by the platform
//! - `drive`: swerve drivetrain, odometry fusion and path following
//! - `vision`: camera pose ingest and alignment predicates
//! - `intake`, `wheels`, `elevator`, `gripper`, `arm`, `climb`: mechanisms
//! - `indicator`: driver-facing colour code
//!
//! Every actuator belongs to exactly one [`Resource`]; commands declare the
//! resources they use and the scheduler hands each to one command at a time.

pub mod arm;
pub mod climb;
pub mod drive;
pub mod elevator;
pub mod gripper;
pub mod hardware;
pub mod indicator;
pub mod intake;
pub mod vision;
pub mod wheels;

use embassy_time::Instant;
use serde::{Deserialize, Serialize};

pub use hardware::{Imu, Motor, SwerveModule};

/// A hardware resource that at most one command may drive at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Drivetrain,
    Elevator,
    Intake,
    Wheels,
    Gripper,
    Arm,
    Climb,
    Indicator,
}

impl Resource {
    pub const ALL: [Resource; 8] = [
        Resource::Drivetrain,
        Resource::Elevator,
        Resource::Intake,
        Resource::Wheels,
        Resource::Gripper,
        Resource::Arm,
        Resource::Climb,
        Resource::Indicator,
    ];

    const fn bit(self) -> u16 {
        1 << self as u16
    }
}

/// Set of resources a command requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceSet(u16);

impl ResourceSet {
    pub const EMPTY: ResourceSet = ResourceSet(0);

    pub const fn of(resource: Resource) -> Self {
        ResourceSet(resource.bit())
    }

    pub fn from_slice(resources: &[Resource]) -> Self {
        resources
            .iter()
            .fold(ResourceSet::EMPTY, |set, r| set.with(*r))
    }

    pub const fn with(
        self,
        resource: Resource,
    ) -> Self {
        ResourceSet(self.0 | resource.bit())
    }

    pub const fn union(
        self,
        other: ResourceSet,
    ) -> Self {
        ResourceSet(self.0 | other.0)
    }

    pub const fn contains(
        self,
        resource: Resource,
    ) -> bool {
        self.0 & resource.bit() != 0
    }

    pub const fn contains_all(
        self,
        other: ResourceSet,
    ) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(
        self,
        other: ResourceSet,
    ) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Resource> {
        Resource::ALL.into_iter().filter(move |r| self.contains(*r))
    }
}

impl From<Resource> for ResourceSet {
    fn from(resource: Resource) -> Self {
        ResourceSet::of(resource)
    }
}

/// Per-tick hook every subsystem implements; runs whether or not a command
/// currently owns the subsystem.
pub trait Subsystem {
    /// The resource this subsystem actuates, if any.
    fn resource(&self) -> Option<Resource>;

    fn periodic(
        &mut self,
        _now: Instant,
    ) {
    }
}

/// A command context that contains subsystem `S`.
///
/// Subsystem command factories are generic over this so they can be built for
/// any context that owns the subsystem.
pub trait Owns<S> {
    fn subsystem(&self) -> &S;
    fn subsystem_mut(&mut self) -> &mut S;
}
