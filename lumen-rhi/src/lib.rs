//! Thin RHI layer over ash + vk-mem.
//!
//! Every wrapper owns its Vulkan handle and is destroyed manually via
//! `destroy()`; `Drop` never touches the device. Fatal device-level errors
//! (queue submission, fence waits, object creation during bootstrap) panic,
//! recoverable ones (allocation for asset data) return `anyhow::Result`.

pub mod core;
pub mod rhi;
