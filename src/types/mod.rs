pub mod image;
pub mod result;
pub mod runtime;

pub use image::*;
pub use result::*;
pub use runtime::*;
