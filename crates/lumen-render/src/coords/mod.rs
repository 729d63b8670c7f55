//! Coordinate and geometry types shared by render targets, filters and masks.
//!
//! Canonical CPU space:
//! - world pixels, origin top-left
//! - +X right, +Y down
//!
//! Render targets turn world space into clip space through a per-target
//! projection [`Matrix`].

mod color;
mod matrix;
mod rect;
mod vec2;

pub use color::ColorRgba;
pub use matrix::Matrix;
pub use rect::Rect;
pub use vec2::Vec2;
