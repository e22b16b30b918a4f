//! Host-visible buffers

use ash::vk;
use vkscene_core::RenderError;
use vkscene_core::render::BufferUsage;

/// A buffer and the memory bound to it. Memory is host visible and coherent,
/// so writes need no flush.
#[derive(Debug, Clone, Copy)]
pub struct HostBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: u64,
}

fn usage_flags(usage: BufferUsage) -> vk::BufferUsageFlags {
    match usage {
        BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
        BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER,
        BufferUsage::TransferSrc => vk::BufferUsageFlags::TRANSFER_SRC,
    }
}

pub fn find_memory_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..properties.memory_type_count).find(|&i| {
        type_bits & (1 << i) != 0
            && properties.memory_types[i as usize]
                .property_flags
                .contains(flags)
    })
}

impl HostBuffer {
    pub fn create(
        device: &ash::Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        usage: BufferUsage,
        size: u64,
    ) -> Result<Self, RenderError> {
        if size == 0 {
            return Err(RenderError::gpu("create_buffer", "zero-sized buffer"));
        }

        let info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage_flags(usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { device.create_buffer(&info, None) }
            .map_err(|e| RenderError::gpu("create_buffer", e))?;

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let Some(memory_type) = find_memory_type(
            memory_properties,
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ) else {
            unsafe { device.destroy_buffer(buffer, None) };
            return Err(RenderError::gpu(
                "create_buffer",
                "no host-visible coherent memory type",
            ));
        };

        let alloc = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);
        let memory = match unsafe { device.allocate_memory(&alloc, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(RenderError::gpu("allocate_memory", e));
            }
        };

        if let Err(e) = unsafe { device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe {
                device.destroy_buffer(buffer, None);
                device.free_memory(memory, None);
            }
            return Err(RenderError::gpu("bind_buffer_memory", e));
        }

        Ok(Self {
            buffer,
            memory,
            size,
        })
    }

    pub fn write(&self, device: &ash::Device, offset: u64, bytes: &[u8]) -> Result<(), RenderError> {
        let len = bytes.len() as u64;
        if offset.checked_add(len).is_none_or(|end| end > self.size) {
            return Err(RenderError::gpu("write_buffer", "write past end of buffer"));
        }
        if bytes.is_empty() {
            return Ok(());
        }
        unsafe {
            let mapped = device
                .map_memory(self.memory, offset, len, vk::MemoryMapFlags::empty())
                .map_err(|e| RenderError::gpu("map_memory", e))?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), mapped.cast::<u8>(), bytes.len());
            device.unmap_memory(self.memory);
        }
        Ok(())
    }

    pub fn destroy(self, device: &ash::Device) {
        unsafe {
            device.destroy_buffer(self.buffer, None);
            device.free_memory(self.memory, None);
        }
    }
}
