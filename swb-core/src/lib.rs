//! Localization and command-sequencing core for a swerve-drive robot on
//! no-std targets.
//!
//! For a runnable host build against mock hardware, see `swb-app/mock-robot`.
#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod utils;
