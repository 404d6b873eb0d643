//! Utility modules and helper macros for the swerve robot core.
//!
//! - `math`: geometry, kinematics, PID, input filters and trajectories
//! - `estimation`: wheel odometry fused with timestamped vision poses
//! - `connection`: latest-value telemetry topics fed by off-board producers
//! - `controllers`: hardware traits and the resource-owning subsystems
//! - `command`: command trees, triggers and the resource-arbitrating scheduler
//! - `robot`: the robot context, operating mode, sequences and autonomous routines
//! - `config`: serde configuration for all of the above
//!
//! The `mk_static!` macro simplifies static initialization in no-std contexts.

pub mod command;
pub mod config;
pub mod connection;
pub mod controllers;
pub mod estimation;
pub mod math;
pub mod robot;

pub use command::{Command, Scheduler};
pub use config::RobotConfig;
pub use embassy_time::*;
pub use robot::{Robot, RobotContainer};

#[macro_export]
/// Initialize a no-std static cell and write the given value into it.
///
/// This macro creates a `static_cell::StaticCell` for type `$t` and initializes
/// it with `$val`, returning a mutable reference to the stored value.
macro_rules! mk_static {
    ($t:ty, $val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        STATIC_CELL.uninit().write($val)
    }};
}
