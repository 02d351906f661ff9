pub mod device;
pub mod loader;
pub mod model;
pub mod text_pipeline;
