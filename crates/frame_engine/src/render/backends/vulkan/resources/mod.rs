//! GPU buffers, images and the descriptors that bind them

#[allow(unsafe_code)]
pub mod buffer;
#[allow(unsafe_code)]
pub mod descriptor_set;
pub mod layout_transition;
#[allow(unsafe_code)]
pub mod memory;
pub mod resource_manager;
#[allow(unsafe_code)]
pub mod texture;
pub mod texture_registry;
#[allow(unsafe_code)]
pub mod uniform;
#[allow(unsafe_code)]
pub mod upload;
