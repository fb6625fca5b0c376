//! Foundation utilities shared by the render core

pub mod logging;
pub mod math;
pub mod time;
