use std::sync::Arc;

use anyhow::Context;
use ash::vk;
use vk_mem::Alloc;

/// VMA-backed buffer.
///
/// The asset loader creates host-visible vertex/index buffers and maps them
/// directly, so every buffer here is created with sequential-write host
/// access; no staging hop is needed for buffer data.
pub struct RhiBuffer {
    handle: vk::Buffer,
    allocation: vk_mem::Allocation,
    size: vk::DeviceSize,
    allocator: Arc<vk_mem::Allocator>,
    map_ptr: Option<*mut u8>,
    debug_name: String,
}

// Buffers are handed from loader threads to the render thread. The raw map
// pointer is only touched by the thread currently holding the buffer, and
// the transfer channel serializes every mutating call.
unsafe impl Send for RhiBuffer {}
unsafe impl Sync for RhiBuffer {}

// new & destroy
impl RhiBuffer {
    pub fn new(
        allocator: Arc<vk_mem::Allocator>,
        buffer_ci: &vk::BufferCreateInfo,
        alloc_ci: &vk_mem::AllocationCreateInfo,
        debug_name: &str,
    ) -> anyhow::Result<Self> {
        let (handle, allocation) = unsafe {
            allocator
                .create_buffer(buffer_ci, alloc_ci)
                .with_context(|| format!("failed to allocate buffer {debug_name} ({} bytes)", buffer_ci.size))?
        };
        Ok(Self {
            handle,
            allocation,
            size: buffer_ci.size,
            allocator,
            map_ptr: None,
            debug_name: debug_name.to_string(),
        })
    }

    pub fn new_vertex_buffer(
        allocator: Arc<vk_mem::Allocator>,
        size: vk::DeviceSize,
        debug_name: &str,
    ) -> anyhow::Result<Self> {
        Self::new(
            allocator,
            &vk::BufferCreateInfo::default()
                .size(size)
                .usage(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
                .sharing_mode(vk::SharingMode::EXCLUSIVE),
            &Self::host_visible_alloc_info(),
            debug_name,
        )
    }

    pub fn new_index_buffer(
        allocator: Arc<vk_mem::Allocator>,
        size: vk::DeviceSize,
        debug_name: &str,
    ) -> anyhow::Result<Self> {
        Self::new(
            allocator,
            &vk::BufferCreateInfo::default()
                .size(size)
                .usage(vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
                .sharing_mode(vk::SharingMode::EXCLUSIVE),
            &Self::host_visible_alloc_info(),
            debug_name,
        )
    }

    /// Transient source buffer for a buffer→image copy.
    pub fn new_staging_buffer(
        allocator: Arc<vk_mem::Allocator>,
        size: vk::DeviceSize,
        debug_name: &str,
    ) -> anyhow::Result<Self> {
        Self::new(
            allocator,
            &vk::BufferCreateInfo::default()
                .size(size)
                .usage(vk::BufferUsageFlags::TRANSFER_SRC)
                .sharing_mode(vk::SharingMode::EXCLUSIVE),
            &vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::Auto,
                flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
                ..Default::default()
            },
            debug_name,
        )
    }

    fn host_visible_alloc_info() -> vk_mem::AllocationCreateInfo {
        vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::Auto,
            flags: vk_mem::AllocationCreateFlags::DEDICATED_MEMORY
                | vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
            ..Default::default()
        }
    }

    #[inline]
    pub fn destroy(mut self) {
        unsafe {
            self.allocator.destroy_buffer(self.handle, &mut self.allocation);
        }
    }
}

// getters
impl RhiBuffer {
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }
}

// map & write
impl RhiBuffer {
    pub fn map(&mut self) -> anyhow::Result<*mut u8> {
        if let Some(ptr) = self.map_ptr {
            return Ok(ptr);
        }
        let ptr = unsafe {
            self.allocator
                .map_memory(&mut self.allocation)
                .with_context(|| format!("failed to map buffer {}", self.debug_name))?
        };
        self.map_ptr = Some(ptr);
        Ok(ptr)
    }

    pub fn unmap(&mut self) {
        if self.map_ptr.take().is_some() {
            unsafe {
                self.allocator.unmap_memory(&mut self.allocation);
            }
        }
    }

    /// Map, copy, flush, unmap. Valid only for host-visible allocations,
    /// which is every buffer this type creates.
    pub fn write_bytes(&mut self, data: &[u8]) -> anyhow::Result<()> {
        anyhow::ensure!(
            data.len() as vk::DeviceSize <= self.size,
            "write of {} bytes exceeds buffer {} ({} bytes)",
            data.len(),
            self.debug_name,
            self.size
        );
        let ptr = self.map()?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, data.len());
        }
        self.allocator
            .flush_allocation(&self.allocation, 0, data.len() as vk::DeviceSize)
            .with_context(|| format!("failed to flush buffer {}", self.debug_name))?;
        self.unmap();
        Ok(())
    }
}
