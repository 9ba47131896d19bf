pub mod input_manager;
pub mod window_system;
