pub mod plan;
pub mod render;
pub mod versions;
