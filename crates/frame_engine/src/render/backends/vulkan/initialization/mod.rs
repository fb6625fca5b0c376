//! Instance, surface and device bring-up

#[allow(unsafe_code)]
pub mod context;
#[allow(unsafe_code)]
pub mod device_selection;
pub mod surface;
