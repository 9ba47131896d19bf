pub mod buffer;
pub mod command;
pub mod device;
pub mod image;
pub mod queue;
pub mod swapchain;
pub mod synchronize;
