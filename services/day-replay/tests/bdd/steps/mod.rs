//! BDD step definitions for day replay service

pub mod day_change_steps;
pub mod lifecycle_steps;
pub mod playback_steps;
pub mod reconstruction_steps;
pub mod sensor_steps;
