pub mod analyze;
pub mod portal;
pub mod stitch;
pub mod submit;
