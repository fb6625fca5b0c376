//! Vulkan context management
//!
//! Owns the instance, the presentation surface, the chosen adapter and the logical
//! device. Each of those objects can be destroyed explicitly (the teardown sequence
//! does this in order) and is otherwise destroyed on drop, so a failure halfway
//! through initialization still releases whatever was created.

use std::ffi::{c_char, CStr, CString};
use std::time::Duration;

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Entry, Instance};
use thiserror::Error;

use crate::assets::AssetError;
use crate::core::config::RendererConfig;
use crate::render::backends::vulkan::initialization::device_selection::{self, name_from_raw, AdapterCandidate};
use crate::render::backends::vulkan::initialization::surface::SurfaceProvider;
use crate::render::window::WindowError;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const ENGINE_NAME: &CStr = c"frame_engine";

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Resource with the given identifier could not be found
    #[error("unable to locate resource with url: {0}")]
    ResourceNotFound(String),

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Device or host memory allocation failed
    #[error("Out of memory: {requested} bytes")]
    OutOfMemory {
        /// Number of bytes that were requested
        requested: u64,
    },

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No physical device passed every capability check
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Required instance or device extensions are not available
    #[error("Missing required extensions: {0:?}")]
    MissingExtensions(Vec<String>),

    /// Pixel data does not match its declared dimensions
    #[error("Invalid image data: {0}")]
    InvalidImageData(String),

    /// No memory type satisfies both the resource requirements and the requested properties
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// Requested layout transition has no barrier definition
    #[error("Unsupported image layout transition {from:?} -> {to:?}")]
    UnsupportedLayoutTransition {
        /// Current layout
        from: vk::ImageLayout,
        /// Requested layout
        to: vk::ImageLayout,
    },

    /// Bounded wait on the GPU expired
    #[error("Timed out after {waited_ms} ms waiting for the device")]
    DeviceTimeout {
        /// Wait budget that expired, in milliseconds
        waited_ms: u64,
    },

    /// Texture array is full
    #[error("Texture limit of {max} reached")]
    TextureLimit {
        /// Configured size of the texture array
        max: u32,
    },

    /// Decoding or reading an asset failed
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    /// Surface provider failure
    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    /// A named lifecycle step failed
    #[error("{step} failed: {source}")]
    Step {
        /// Step that failed
        step: &'static str,
        /// Underlying error
        source: Box<VulkanError>,
    },
}

impl VulkanError {
    /// Attach the name of the failing lifecycle step
    #[must_use]
    pub fn during(self, step: &'static str) -> Self {
        Self::Step {
            step,
            source: Box::new(self),
        }
    }

    /// Classify an allocation failure
    pub fn from_allocation(result: vk::Result, requested: u64) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
                Self::OutOfMemory { requested }
            }
            other => Self::Api(other),
        }
    }

    /// Innermost error, skipping step annotations
    pub fn root(&self) -> &Self {
        match self {
            Self::Step { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Annotate a result with the lifecycle step that produced it
pub trait StepContext<T> {
    /// Wrap an error in [`VulkanError::Step`]
    fn step(self, step: &'static str) -> VulkanResult<T>;
}

impl<T> StepContext<T> for VulkanResult<T> {
    fn step(self, step: &'static str) -> VulkanResult<T> {
        self.map_err(|e| e.during(step))
    }
}

/// Vulkan instance with an optional validation messenger
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    destroyed: bool,
}

impl VulkanInstance {
    /// Create a new Vulkan instance with the extensions the surface provider requires
    pub fn new(provider: &dyn SurfaceProvider, config: &RendererConfig) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e}")))?;

        let app_name = CString::new(config.application_name.as_str())
            .map_err(|e| VulkanError::InitializationFailed(format!("Invalid application name: {e}")))?;
        let (major, minor, patch) = config.application_version;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        let required_extensions = provider.required_instance_extensions()?;
        let extension_names = required_extensions
            .iter()
            .map(|ext| CString::new(ext.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| VulkanError::InitializationFailed(format!("Invalid extension name: {e}")))?;

        Self::check_instance_extensions(&entry, &required_extensions)?;

        let validation = config.validation_enabled() && Self::validation_layer_available(&entry)?;

        let mut extensions: Vec<*const c_char> = extension_names.iter().map(|ext| ext.as_ptr()).collect();
        let mut layers: Vec<*const c_char> = Vec::new();
        if validation {
            extensions.push(DebugUtils::name().as_ptr());
            layers.push(VALIDATION_LAYER.as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None).map_err(VulkanError::Api)? };

        let debug = if validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        log::debug!(
            "Created Vulkan instance with {} extension(s), validation {}",
            extensions.len(),
            if validation { "on" } else { "off" }
        );

        Ok(Self {
            entry,
            instance,
            debug,
            destroyed: false,
        })
    }

    fn check_instance_extensions(entry: &Entry, required: &[String]) -> VulkanResult<()> {
        let available = entry
            .enumerate_instance_extension_properties(None)
            .map_err(VulkanError::Api)?;
        let available: Vec<String> = available.iter().map(|ext| name_from_raw(&ext.extension_name)).collect();
        let missing: Vec<String> = required.iter().filter(|name| !available.contains(name)).cloned().collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(VulkanError::MissingExtensions(missing))
        }
    }

    fn validation_layer_available(entry: &Entry) -> VulkanResult<bool> {
        let layers = entry.enumerate_instance_layer_properties().map_err(VulkanError::Api)?;
        let wanted = VALIDATION_LAYER.to_string_lossy();
        let available = layers.iter().any(|layer| name_from_raw(&layer.layer_name) == wanted);
        if !available {
            log::warn!("{} requested but not installed, continuing without validation", wanted);
        }
        Ok(available)
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    /// Destroy the messenger and the instance; later calls do nothing
    pub fn destroy(&mut self) {
        if std::mem::replace(&mut self.destroyed, true) {
            return;
        }
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        log::debug!("Destroyed Vulkan instance");
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Presentation surface handle
pub struct SurfaceHandle {
    loader: Surface,
    surface: vk::SurfaceKHR,
}

impl SurfaceHandle {
    /// Create the surface through the provider
    pub fn new(instance: &VulkanInstance, provider: &mut dyn SurfaceProvider) -> VulkanResult<Self> {
        let loader = Surface::new(&instance.entry, &instance.instance);
        let surface = provider.create_surface(instance.instance.handle())?;
        Ok(Self { loader, surface })
    }

    /// Get the surface handle
    pub const fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Get the surface loader
    pub const fn loader(&self) -> &Surface {
        &self.loader
    }

    /// Destroy the surface; later calls do nothing
    pub fn destroy(&mut self) {
        if self.surface == vk::SurfaceKHR::null() {
            return;
        }
        unsafe { self.loader.destroy_surface(self.surface, None) };
        self.surface = vk::SurfaceKHR::null();
        log::debug!("Destroyed surface");
    }
}

impl Drop for SurfaceHandle {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Logical device with its graphics and present queues
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
    anisotropy_enabled: bool,
    destroyed: bool,
}

impl LogicalDevice {
    /// Create the logical device: one queue of priority 1.0 per distinct family
    pub fn new(instance: &Instance, adapter: &AdapterCandidate) -> VulkanResult<Self> {
        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = adapter
            .queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let required_extensions: Vec<*const c_char> = device_selection::required_device_extensions()
            .iter()
            .map(|name| name.as_ptr())
            .collect();

        let anisotropy_enabled = adapter.supports_anisotropy();
        let device_features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(anisotropy_enabled)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&required_extensions)
            .enabled_features(&device_features);

        let device = unsafe {
            instance
                .create_device(adapter.physical_device, &create_info, None)
                .map_err(VulkanError::Api)?
        };

        let families = adapter.queue_families;
        let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(families.present, 0) };
        let swapchain_loader = SwapchainLoader::new(instance, &device);

        log::debug!("Created logical device with {} queue(s)", queue_infos.len());

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            swapchain_loader,
            anisotropy_enabled,
            destroyed: false,
        })
    }

    /// Whether `samplerAnisotropy` was enabled at creation
    pub const fn anisotropy_enabled(&self) -> bool {
        self.anisotropy_enabled
    }

    /// Destroy the device; later calls do nothing
    pub fn destroy(&mut self) {
        if std::mem::replace(&mut self.destroyed, true) {
            return;
        }
        unsafe { self.device.destroy_device(None) };
        log::debug!("Destroyed logical device");
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Device-scope objects: instance, surface, chosen adapter, logical device
///
/// Field order is drop order: surface, then device, then instance.
pub struct VulkanContext {
    surface: SurfaceHandle,
    device: LogicalDevice,
    instance: VulkanInstance,
    adapter: AdapterCandidate,
}

impl VulkanContext {
    /// Create instance, surface and device for the given provider
    pub fn new(provider: &mut dyn SurfaceProvider, config: &RendererConfig) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(provider, config).step("create instance")?;
        let surface = SurfaceHandle::new(&instance, provider).step("create surface")?;

        let adapter = device_selection::negotiate(
            &instance.instance,
            surface.loader(),
            surface.handle(),
            config.device_selection,
        )
        .step("select device")?;

        let device = LogicalDevice::new(&instance.instance, &adapter).step("create logical device")?;

        Ok(Self {
            surface,
            device,
            instance,
            adapter,
        })
    }

    /// Get the surface handle
    pub const fn surface(&self) -> vk::SurfaceKHR {
        self.surface.handle()
    }

    /// Get the surface loader
    pub const fn surface_loader(&self) -> &Surface {
        self.surface.loader()
    }

    /// Get the chosen adapter
    pub const fn adapter(&self) -> &AdapterCandidate {
        &self.adapter
    }

    /// Get the memory-property table of the chosen adapter
    pub const fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.adapter.memory_properties
    }

    /// Get the logical device wrapper
    pub const fn logical_device(&self) -> &LogicalDevice {
        &self.device
    }

    /// Get the raw device handle
    pub const fn device(&self) -> &Device {
        &self.device.device
    }

    /// Get the swapchain loader
    pub const fn swapchain_loader(&self) -> &SwapchainLoader {
        &self.device.swapchain_loader
    }

    /// Get the graphics queue
    pub const fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Get the present queue
    pub const fn present_queue(&self) -> vk::Queue {
        self.device.present_queue
    }

    /// Wait until the device is idle, giving up after `timeout`
    ///
    /// `device_wait_idle` has no timeout of its own, so the in-flight fences are
    /// waited first with the budget; only once they have all signaled is the
    /// unbounded idle call made.
    pub fn wait_idle_bounded(&self, in_flight: &[vk::Fence], timeout: Duration) -> VulkanResult<()> {
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        if !in_flight.is_empty() {
            let timeout_ns = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
            match unsafe { self.device().wait_for_fences(in_flight, true, timeout_ns) } {
                Ok(()) => {}
                Err(vk::Result::TIMEOUT) => return Err(VulkanError::DeviceTimeout { waited_ms: timeout_ms }),
                Err(e) => return Err(VulkanError::Api(e)),
            }
        }
        unsafe { self.device().device_wait_idle().map_err(VulkanError::Api) }
    }

    /// Destroy the surface
    pub fn destroy_surface(&mut self) {
        self.surface.destroy();
    }

    /// Destroy the logical device
    pub fn destroy_device(&mut self) {
        self.device.destroy();
    }

    /// Destroy the instance
    pub fn destroy_instance(&mut self) {
        self.instance.destroy();
    }
}
