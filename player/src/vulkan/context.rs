//! Instance, surface, logical device and command pool

use std::ffi::{CStr, CString, c_char};

use anyhow::{Context, Result, anyhow};
use ash::khr::{surface, swapchain};
use ash::{Entry, vk};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info, warn};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Long-lived Vulkan objects tied to one window surface.
///
/// Everything here outlives the swapchain bundle. Dropped in reverse
/// creation order after the device is idle.
pub struct VulkanContext {
    _entry: Entry,
    pub instance: ash::Instance,
    pub surface_loader: surface::Instance,
    pub surface: vk::SurfaceKHR,
    pub physical_device: vk::PhysicalDevice,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub device: ash::Device,
    pub queue: vk::Queue,
    pub swapchain_loader: swapchain::Device,
    pub command_pool: vk::CommandPool,
    pub device_name: String,
}

impl VulkanContext {
    pub fn new<W>(window: &W, validation: bool) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| anyhow!("display handle: {e}"))?
            .as_raw();
        let handle = window
            .window_handle()
            .map_err(|e| anyhow!("window handle: {e}"))?
            .as_raw();

        let entry = unsafe { Entry::load() }.context("Failed to load the Vulkan loader")?;
        let instance = create_instance(&entry, display, validation)?;
        let surface_loader = surface::Instance::new(&entry, &instance);

        let surface = match unsafe {
            ash_window::create_surface(&entry, &instance, display, handle, None)
        } {
            Ok(surface) => surface,
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(anyhow!("Failed to create window surface: {e}"));
            }
        };

        let picked = match pick_device(&instance, &surface_loader, surface) {
            Ok(picked) => picked,
            Err(e) => {
                unsafe {
                    surface_loader.destroy_surface(surface, None);
                    instance.destroy_instance(None);
                }
                return Err(e);
            }
        };

        let device = match create_device(&instance, picked.physical_device, picked.queue_family)
        {
            Ok(device) => device,
            Err(e) => {
                unsafe {
                    surface_loader.destroy_surface(surface, None);
                    instance.destroy_instance(None);
                }
                return Err(e);
            }
        };

        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(picked.queue_family);
        let command_pool = match unsafe { device.create_command_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe {
                    device.destroy_device(None);
                    surface_loader.destroy_surface(surface, None);
                    instance.destroy_instance(None);
                }
                return Err(anyhow!("Failed to create command pool: {e}"));
            }
        };

        let queue = unsafe { device.get_device_queue(picked.queue_family, 0) };
        let swapchain_loader = swapchain::Device::new(&instance, &device);
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(picked.physical_device) };

        info!(
            "Vulkan device: {} (queue family {})",
            picked.name, picked.queue_family
        );

        Ok(Self {
            _entry: entry,
            instance,
            surface_loader,
            surface,
            physical_device: picked.physical_device,
            memory_properties,
            device,
            queue,
            swapchain_loader,
            command_pool,
            device_name: picked.name,
        })
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                warn!("device_wait_idle failed during teardown: {}", e);
            }
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
        debug!("Vulkan context destroyed");
    }
}

fn create_instance(
    entry: &Entry,
    display: raw_window_handle::RawDisplayHandle,
    validation: bool,
) -> Result<ash::Instance> {
    let app_name = CString::new("vkscene")?;
    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(0)
        .engine_name(&app_name)
        .engine_version(0)
        .api_version(vk::API_VERSION_1_1);

    let extensions = ash_window::enumerate_required_extensions(display)
        .context("Failed to enumerate surface extensions")?;

    let mut layers: Vec<*const c_char> = Vec::new();
    if validation {
        let available = unsafe { entry.enumerate_instance_layer_properties() }
            .context("Failed to enumerate instance layers")?;
        let present = available
            .iter()
            .any(|layer| layer.layer_name_as_c_str().ok() == Some(VALIDATION_LAYER));
        if present {
            layers.push(VALIDATION_LAYER.as_ptr());
            info!("Vulkan validation enabled");
        } else {
            warn!("Validation requested but {:?} is not installed", VALIDATION_LAYER);
        }
    }

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(extensions)
        .enabled_layer_names(&layers);

    unsafe { entry.create_instance(&create_info, None) }.context("Failed to create Vulkan instance")
}

struct PickedDevice {
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
    name: String,
}

/// First device with a graphics queue that can present to `surface` and
/// supports swapchains. Discrete GPUs win.
fn pick_device(
    instance: &ash::Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<PickedDevice> {
    let devices = unsafe { instance.enumerate_physical_devices() }
        .context("Failed to enumerate physical devices")?;

    let mut best: Option<(bool, PickedDevice)> = None;
    for physical_device in devices {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let name = properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());

        let has_swapchain = unsafe {
            instance.enumerate_device_extension_properties(physical_device)
        }
        .map(|extensions| {
            extensions
                .iter()
                .any(|ext| ext.extension_name_as_c_str().ok() == Some(swapchain::NAME))
        })
        .unwrap_or(false);
        if !has_swapchain {
            debug!("Skipping {}: no swapchain support", name);
            continue;
        }

        let families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        let queue_family = families.iter().enumerate().find_map(|(i, family)| {
            let index = i as u32;
            let presents = unsafe {
                surface_loader.get_physical_device_surface_support(physical_device, index, surface)
            }
            .unwrap_or(false);
            (family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && presents).then_some(index)
        });
        let Some(queue_family) = queue_family else {
            debug!("Skipping {}: no graphics queue that can present", name);
            continue;
        };

        let discrete = properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU;
        if best.as_ref().is_none_or(|(was_discrete, _)| discrete && !was_discrete) {
            best = Some((
                discrete,
                PickedDevice {
                    physical_device,
                    queue_family,
                    name,
                },
            ));
        }
    }

    best.map(|(_, picked)| picked)
        .ok_or_else(|| anyhow!("No Vulkan device can present to this window"))
}

fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
) -> Result<ash::Device> {
    let priorities = [1.0_f32];
    let queue_info = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_family)
        .queue_priorities(&priorities)];
    let extensions = [swapchain::NAME.as_ptr()];

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_info)
        .enabled_extension_names(&extensions);

    unsafe { instance.create_device(physical_device, &create_info, None) }
        .context("Failed to create logical device")
}
