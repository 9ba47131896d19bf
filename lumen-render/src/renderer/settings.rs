use std::path::PathBuf;

use ash::vk;

pub struct RendererSettings {
    pub app_name: String,
    pub frames_in_flight: usize,
    pub present_mode: vk::PresentModeKHR,
    pub clear_color: [f32; 4],
    /// Directory holding the compiled `model.vert.spv` / `model.frag.spv`.
    pub shader_dir: PathBuf,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            app_name: "lumen".to_string(),
            frames_in_flight: 2,
            present_mode: vk::PresentModeKHR::FIFO,
            clear_color: [0.01, 0.01, 0.02, 1.0],
            shader_dir: PathBuf::from("shaders"),
        }
    }
}
