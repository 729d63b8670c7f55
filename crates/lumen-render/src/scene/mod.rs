//! Scene-side vocabulary consumed by the renderer.
//!
//! Responsibilities:
//! - the [`SceneNode`] seam implemented by the external scene graph
//! - draw commands for the built-in object renderers
//! - vector shapes and masks
//!
//! Geometry is in world pixels (top-left origin, +Y down).

mod draw;
mod mask;
mod node;
mod shape;

pub use draw::{DrawCmd, ShapeDraw, SpriteDraw};
pub use mask::{MaskShape, MaskSource};
pub use node::SceneNode;
pub use shape::{Shape, ShapeKind};
