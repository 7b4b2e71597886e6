//! Vulkan device negotiation for a session's graphics binding.

use std::ffi::CString;

use ash::vk::{self, Handle};
use ash::Entry as VkEntry;
use openxr as xr;
use xr::sys;
use xr_provider::runtime::{VulkanBinding, XrResult};

const APP_NAME: &str = "xr-provider";

pub(crate) struct VulkanDevice {
    device: ash::Device,
    instance: ash::Instance,
    _entry: VkEntry,
    physical_device: vk::PhysicalDevice,
    queue_family_index: u32,
}

impl VulkanDevice {
    // enable2: runtime creates instance and device, else legacy extension lists
    pub(crate) fn negotiate(
        xr_instance: &xr::Instance,
        system: xr::SystemId,
        enable2: bool,
    ) -> XrResult<Self> {
        let entry = unsafe { VkEntry::load() }.map_err(|e| {
            log::error!("Vulkan entry load failed: {e}");
            sys::Result::ERROR_RUNTIME_FAILURE
        })?;

        let reqs = xr_instance
            .graphics_requirements::<xr::Vulkan>(system)
            .map_err(|e| {
                log::error!("OpenXR Vulkan requirements: {e}");
                e
            })?;
        let api_version = vk::make_api_version(
            0,
            reqs.min_api_version_supported.major() as u32,
            reqs.min_api_version_supported.minor() as u32,
            reqs.min_api_version_supported.patch(),
        );
        log::debug!(
            "Vulkan api {}..{} required",
            reqs.min_api_version_supported,
            reqs.max_api_version_supported
        );

        let app_name = CString::new(APP_NAME).map_err(|_| sys::Result::ERROR_RUNTIME_FAILURE)?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .engine_name(&app_name)
            .api_version(api_version);

        let instance = if enable2 {
            create_instance_enable2(xr_instance, system, &entry, &app_info)?
        } else {
            create_instance_legacy(xr_instance, system, &entry, &app_info)?
        };

        match create_device(xr_instance, system, &entry, &instance, enable2) {
            Ok((device, physical_device, queue_family_index)) => {
                log::info!(
                    "Vulkan device ready (queue family {queue_family_index}, {})",
                    if enable2 { "enable2" } else { "enable" }
                );
                Ok(Self {
                    device,
                    instance,
                    _entry: entry,
                    physical_device,
                    queue_family_index,
                })
            }
            Err(code) => {
                unsafe { instance.destroy_instance(None) };
                Err(code)
            }
        }
    }

    pub(crate) fn binding(&self) -> VulkanBinding {
        VulkanBinding {
            instance: self.instance.handle().as_raw(),
            physical_device: self.physical_device.as_raw(),
            device: self.device.handle().as_raw(),
            queue_family_index: self.queue_family_index,
            queue_index: 0,
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                log::warn!("Vulkan device wait idle failed: {e}");
            }
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

fn create_device(
    xr_instance: &xr::Instance,
    system: xr::SystemId,
    entry: &VkEntry,
    instance: &ash::Instance,
    enable2: bool,
) -> XrResult<(ash::Device, vk::PhysicalDevice, u32)> {
    let physical_device = unsafe {
        xr_instance.vulkan_graphics_device(system, instance.handle().as_raw() as *const _)
    }
    .map_err(|e| {
        log::error!("OpenXR Vulkan graphics device: {e}");
        e
    })?;
    let physical_device = vk::PhysicalDevice::from_raw(physical_device as u64);

    let queue_family_index =
        find_graphics_queue_family(instance, physical_device).ok_or_else(|| {
            log::error!("no Vulkan graphics queue family");
            sys::Result::ERROR_GRAPHICS_DEVICE_INVALID
        })?;

    let priorities = [1.0f32];
    let queue_info = vk::DeviceQueueCreateInfo::builder()
        .queue_family_index(queue_family_index)
        .queue_priorities(&priorities);

    let device = if enable2 {
        create_device_enable2(xr_instance, system, entry, instance, physical_device, &queue_info)?
    } else {
        create_device_legacy(xr_instance, system, instance, physical_device, &queue_info)?
    };
    Ok((device, physical_device, queue_family_index))
}

fn create_instance_legacy(
    xr_instance: &xr::Instance,
    system: xr::SystemId,
    entry: &VkEntry,
    app_info: &vk::ApplicationInfo,
) -> XrResult<ash::Instance> {
    let instance_exts = xr_instance
        .vulkan_legacy_instance_extensions(system)
        .map_err(|e| {
            log::error!("OpenXR Vulkan instance extensions: {e}");
            e
        })?;
    let instance_exts = parse_extension_list(&instance_exts);
    let instance_ext_ptrs: Vec<*const i8> = instance_exts.iter().map(|s| s.as_ptr()).collect();

    let create_info = vk::InstanceCreateInfo::builder()
        .application_info(app_info)
        .enabled_extension_names(&instance_ext_ptrs);

    unsafe { entry.create_instance(&create_info, None) }.map_err(|e| {
        log::error!("Vulkan instance create failed: {e}");
        sys::Result::ERROR_GRAPHICS_DEVICE_INVALID
    })
}

fn create_instance_enable2(
    xr_instance: &xr::Instance,
    system: xr::SystemId,
    entry: &VkEntry,
    app_info: &vk::ApplicationInfo,
) -> XrResult<ash::Instance> {
    let create_info = vk::InstanceCreateInfo::builder().application_info(app_info);
    let raw = unsafe {
        xr_instance.create_vulkan_instance(
            system,
            std::mem::transmute(entry.static_fn().get_instance_proc_addr),
            &*create_info as *const _ as *const _,
        )
    }
    .map_err(|e| {
        log::error!("OpenXR Vulkan instance create: {e}");
        e
    })?
    .map_err(|code| {
        log::error!("Vulkan instance create failed: {}", vk::Result::from_raw(code));
        sys::Result::ERROR_GRAPHICS_DEVICE_INVALID
    })?;
    Ok(unsafe { ash::Instance::load(entry.static_fn(), vk::Instance::from_raw(raw as _)) })
}

fn create_device_legacy(
    xr_instance: &xr::Instance,
    system: xr::SystemId,
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_info: &vk::DeviceQueueCreateInfo,
) -> XrResult<ash::Device> {
    let device_exts = xr_instance
        .vulkan_legacy_device_extensions(system)
        .map_err(|e| {
            log::error!("OpenXR Vulkan device extensions: {e}");
            e
        })?;
    let device_exts = parse_extension_list(&device_exts);
    let device_ext_ptrs: Vec<*const i8> = device_exts.iter().map(|s| s.as_ptr()).collect();

    let device_create = vk::DeviceCreateInfo::builder()
        .queue_create_infos(std::slice::from_ref(queue_info))
        .enabled_extension_names(&device_ext_ptrs);

    unsafe { instance.create_device(physical_device, &device_create, None) }.map_err(|e| {
        log::error!("Vulkan device create failed: {e}");
        sys::Result::ERROR_GRAPHICS_DEVICE_INVALID
    })
}

fn create_device_enable2(
    xr_instance: &xr::Instance,
    system: xr::SystemId,
    entry: &VkEntry,
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_info: &vk::DeviceQueueCreateInfo,
) -> XrResult<ash::Device> {
    let device_create =
        vk::DeviceCreateInfo::builder().queue_create_infos(std::slice::from_ref(queue_info));
    let raw = unsafe {
        xr_instance.create_vulkan_device(
            system,
            std::mem::transmute(entry.static_fn().get_instance_proc_addr),
            physical_device.as_raw() as _,
            &*device_create as *const _ as *const _,
        )
    }
    .map_err(|e| {
        log::error!("OpenXR Vulkan device create: {e}");
        e
    })?
    .map_err(|code| {
        log::error!("Vulkan device create failed: {}", vk::Result::from_raw(code));
        sys::Result::ERROR_GRAPHICS_DEVICE_INVALID
    })?;
    Ok(unsafe { ash::Device::load(instance.fp_v1_0(), vk::Device::from_raw(raw as _)) })
}

fn parse_extension_list(list: &str) -> Vec<CString> {
    list.split_whitespace()
        .filter_map(|s| CString::new(s).ok())
        .collect()
}

fn find_graphics_queue_family(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Option<u32> {
    let families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
    families
        .iter()
        .enumerate()
        .find(|(_, family)| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|(idx, _)| idx as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extension_list_splits_on_whitespace() {
        let parsed =
            parse_extension_list("VK_KHR_surface  VK_KHR_external_memory\tVK_EXT_debug_utils\n");
        let names: Vec<&str> = parsed.iter().map(|s| s.to_str().unwrap()).collect();
        assert_eq!(
            names,
            vec!["VK_KHR_surface", "VK_KHR_external_memory", "VK_EXT_debug_utils"]
        );
    }

    #[test]
    fn test_parse_extension_list_empty() {
        assert!(parse_extension_list("   ").is_empty());
        assert!(parse_extension_list("").is_empty());
    }
}
