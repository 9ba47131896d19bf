pub mod frame_scheduler;
pub mod renderer;
pub mod settings;
