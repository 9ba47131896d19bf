pub mod asset_hub;
pub mod gltf_loader;
pub mod model;
pub mod task_pool;
pub mod upload;
