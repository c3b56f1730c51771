//! HTTP request handlers.

pub mod health;
pub mod predict;

pub use health::{health, ready};
pub use predict::{example, upload_image, upload_video};
