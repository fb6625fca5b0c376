//! Adapter negotiation
//!
//! Every physical device is evaluated against the same requirements: a graphics
//! queue family, a family that can present to the surface, the swapchain extension,
//! and at least one surface format and present mode. Candidates that pass are
//! handed to [`select_candidate`], which applies the configured
//! [`DeviceSelectionPolicy`].

use std::ffi::{c_char, CStr};

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Instance};

use crate::core::config::DeviceSelectionPolicy;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Device extensions every candidate must expose
pub fn required_device_extensions() -> [&'static CStr; 1] {
    [SwapchainLoader::name()]
}

/// Convert a fixed-size, nul-terminated Vulkan name array into a `String`
#[allow(clippy::cast_sign_loss)]
pub fn name_from_raw(raw: &[c_char]) -> String {
    let bytes: Vec<u8> = raw.iter().take_while(|&&c| c != 0).map(|&c| c as u8).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Surface capability record for one adapter
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    /// Image count, extent and transform limits
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported format/color-space pairs
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// Query the surface capabilities of `physical_device`
    pub fn query(
        surface_loader: &Surface,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VulkanResult<Self> {
        unsafe {
            let capabilities = surface_loader
                .get_physical_device_surface_capabilities(physical_device, surface)
                .map_err(VulkanError::Api)?;
            let formats = surface_loader
                .get_physical_device_surface_formats(physical_device, surface)
                .map_err(VulkanError::Api)?;
            let present_modes = surface_loader
                .get_physical_device_surface_present_modes(physical_device, surface)
                .map_err(VulkanError::Api)?;

            Ok(Self {
                capabilities,
                formats,
                present_modes,
            })
        }
    }

    /// A swapchain can only be built if at least one format and one present mode exist
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Queue family indices used for rendering and presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// First family with graphics support
    pub graphics: u32,
    /// First family able to present to the surface
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Whether graphics and presentation share one family
    pub const fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, one queue is created per entry
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Record the first graphics family and the first present-capable family
///
/// Returns `None` if either is missing.
pub fn find_queue_families<F>(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: F,
) -> VulkanResult<Option<QueueFamilyIndices>>
where
    F: FnMut(u32) -> VulkanResult<bool>,
{
    let mut graphics = None;
    let mut present = None;

    for (index, family) in (0u32..).zip(families) {
        if graphics.is_none() && family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            graphics = Some(index);
        }
        if present.is_none() && supports_present(index)? {
            present = Some(index);
        }
        if graphics.is_some() && present.is_some() {
            break;
        }
    }

    Ok(graphics.zip(present).map(|(graphics, present)| QueueFamilyIndices { graphics, present }))
}

/// Names from `required` that `available` does not contain
pub fn missing_extensions(available: &[vk::ExtensionProperties], required: &[&CStr]) -> Vec<String> {
    let available: Vec<String> = available.iter().map(|ext| name_from_raw(&ext.extension_name)).collect();

    required
        .iter()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !available.contains(name))
        .collect()
}

/// Reason an adapter was not considered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// No graphics or no present-capable queue family
    MissingQueueFamilies,
    /// One or more required device extensions are absent
    MissingExtensions(Vec<String>),
    /// The surface reports no formats or no present modes
    InadequateSurface,
}

/// A physical device that passed every capability check
#[derive(Debug, Clone)]
pub struct AdapterCandidate {
    /// Physical device handle
    pub physical_device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported optional features
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory types and heaps, retained for the lifetime of the renderer
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Graphics and present queue families
    pub queue_families: QueueFamilyIndices,
    /// Surface capabilities at negotiation time
    pub surface_support: SurfaceSupport,
}

impl AdapterCandidate {
    /// Evaluate one physical device
    pub fn evaluate(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        surface_loader: &Surface,
        surface: vk::SurfaceKHR,
    ) -> VulkanResult<Result<Self, Rejection>> {
        let queue_family_properties =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

        let queue_families = find_queue_families(&queue_family_properties, |index| unsafe {
            surface_loader
                .get_physical_device_surface_support(physical_device, index, surface)
                .map_err(VulkanError::Api)
        })?;
        let Some(queue_families) = queue_families else {
            return Ok(Err(Rejection::MissingQueueFamilies));
        };

        let extensions = unsafe {
            instance
                .enumerate_device_extension_properties(physical_device)
                .map_err(VulkanError::Api)?
        };
        let missing = missing_extensions(&extensions, &required_device_extensions());
        if !missing.is_empty() {
            return Ok(Err(Rejection::MissingExtensions(missing)));
        }

        let surface_support = SurfaceSupport::query(surface_loader, physical_device, surface)?;
        if !surface_support.is_adequate() {
            return Ok(Err(Rejection::InadequateSurface));
        }

        let (properties, features, memory_properties) = unsafe {
            (
                instance.get_physical_device_properties(physical_device),
                instance.get_physical_device_features(physical_device),
                instance.get_physical_device_memory_properties(physical_device),
            )
        };

        Ok(Ok(Self {
            physical_device,
            properties,
            features,
            memory_properties,
            queue_families,
            surface_support,
        }))
    }

    /// Human-readable device name
    pub fn name(&self) -> String {
        name_from_raw(&self.properties.device_name)
    }

    /// Total size of all device-local heaps in bytes
    pub fn device_local_memory(&self) -> u64 {
        let heap_count = self.memory_properties.memory_heap_count as usize;
        self.memory_properties.memory_heaps[..heap_count.min(vk::MAX_MEMORY_HEAPS)]
            .iter()
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }

    /// Whether anisotropic filtering can be enabled on the logical device
    pub fn supports_anisotropy(&self) -> bool {
        self.features.sampler_anisotropy == vk::TRUE
    }
}

/// Preference order of device types under [`DeviceSelectionPolicy::PreferDiscrete`]
pub const fn device_type_rank(device_type: vk::PhysicalDeviceType) -> u8 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 4,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 3,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 1,
        _ => 0,
    }
}

/// Pick one of the suitable candidates, returning its index
pub fn select_candidate(candidates: &[AdapterCandidate], policy: DeviceSelectionPolicy) -> Option<usize> {
    match policy {
        DeviceSelectionPolicy::LastSuitable => candidates.len().checked_sub(1),
        // max_by_key keeps the last of equal maxima
        DeviceSelectionPolicy::PreferDiscrete => candidates
            .iter()
            .enumerate()
            .max_by_key(|(_, candidate)| {
                (
                    device_type_rank(candidate.properties.device_type),
                    candidate.device_local_memory(),
                )
            })
            .map(|(index, _)| index),
    }
}

/// Enumerate every physical device and choose one according to `policy`
///
/// When nothing qualifies and some adapter was turned away for lacking
/// extensions, the missing names are reported instead of a bare
/// [`VulkanError::NoSuitableDevice`].
pub fn negotiate(
    instance: &Instance,
    surface_loader: &Surface,
    surface: vk::SurfaceKHR,
    policy: DeviceSelectionPolicy,
) -> VulkanResult<AdapterCandidate> {
    let devices = unsafe { instance.enumerate_physical_devices().map_err(VulkanError::Api)? };
    log::debug!("Found {} physical device(s)", devices.len());

    let mut candidates = Vec::new();
    let mut missing = Vec::new();
    for physical_device in devices {
        match AdapterCandidate::evaluate(instance, physical_device, surface_loader, surface)? {
            Ok(candidate) => {
                log::debug!(
                    "Suitable adapter: {} ({:?})",
                    candidate.name(),
                    candidate.properties.device_type
                );
                candidates.push(candidate);
            }
            Err(reason) => {
                if let Rejection::MissingExtensions(names) = &reason {
                    missing.extend(names.iter().cloned());
                }
                let properties = unsafe { instance.get_physical_device_properties(physical_device) };
                log::debug!("Rejected adapter {}: {:?}", name_from_raw(&properties.device_name), reason);
            }
        }
    }

    let Some(index) = select_candidate(&candidates, policy) else {
        missing.sort();
        missing.dedup();
        return Err(if missing.is_empty() {
            VulkanError::NoSuitableDevice
        } else {
            VulkanError::MissingExtensions(missing)
        });
    };
    let chosen = candidates.swap_remove(index);
    log::info!(
        "Selected GPU: {} (graphics family {}, present family {})",
        chosen.name(),
        chosen.queue_families.graphics,
        chosen.queue_families.present
    );
    Ok(chosen)
}
