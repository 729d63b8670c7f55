//! Lumen render crate.
//!
//! GPU backend of a retained-mode 2D scene renderer: render targets, filters,
//! masks, texture lifetimes and recovery from graphics-context loss.

pub mod coords;
pub mod device;
pub mod logging;
pub mod render;
pub mod scene;
