//! Engine core: frame scheduling, asset streaming and the platform glue
//! that binds them to a window.

pub mod asset;
pub mod logging;
pub mod platform;
pub mod renderer;
pub mod transfer;
