use serde::{Deserialize, Serialize};

use super::geometry::wrap_angle;

/// Proportional, integral and derivative gains.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl PidGains {
    pub const fn new(
        kp: f32,
        ki: f32,
        kd: f32,
    ) -> Self {
        Self { kp, ki, kd }
    }
}

/// A simple discrete PID controller.
#[derive(Debug, Clone)]
pub struct PidController {
    kp: f32,
    ki: f32,
    kd: f32,
    prev_err: f32,
    integral: f32,
    dt: f32,
    continuous: bool,
}

impl PidController {
    pub fn new(
        gains: PidGains,
        dt: f32,
    ) -> Self {
        Self {
            kp: gains.kp,
            ki: gains.ki,
            kd: gains.kd,
            prev_err: 0.0,
            integral: 0.0,
            dt,
            continuous: false,
        }
    }

    /// Treat the error as an angle in radians, always taking the short way round.
    pub fn with_continuous_angle(mut self) -> Self {
        self.continuous = true;
        self
    }

    /// Compute control output for the current error.
    pub fn update(
        &mut self,
        error: f32,
    ) -> f32 {
        let error = if self.continuous {
            wrap_angle(error)
        } else {
            error
        };
        // derivative is undefined without a positive period
        let derivative = if self.dt > 0.0 {
            self.integral += error * self.dt;
            (error - self.prev_err) / self.dt
        } else {
            0.0
        };
        self.prev_err = error;
        self.kp * error + self.ki * self.integral + self.kd * derivative
    }

    /// Compute control output driving `measurement` toward `setpoint`.
    pub fn calculate(
        &mut self,
        measurement: f32,
        setpoint: f32,
    ) -> f32 {
        self.update(setpoint - measurement)
    }

    /// Reset integrator and derivative history.
    pub fn reset(&mut self) {
        self.prev_err = 0.0;
        self.integral = 0.0;
    }
}
