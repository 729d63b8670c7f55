use crate::coords::{ColorRgba, Matrix, Rect, Vec2};
use crate::device::BlendMode;
use crate::render::{RendererKind, TextureKey};

use super::shape::Shape;

/// Draw command handed to [`Renderer::draw`](crate::render::Renderer::draw).
///
/// Each variant is consumed by the object renderer of the matching
/// [`RendererKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCmd {
    Shape(ShapeDraw),
    Sprite(SpriteDraw),
}

impl DrawCmd {
    pub fn kind(&self) -> RendererKind {
        match self {
            DrawCmd::Shape(_) => RendererKind::Shape,
            DrawCmd::Sprite(_) => RendererKind::Sprite,
        }
    }
}

/// Vector shapes sharing one world transform.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeDraw {
    pub shapes: Vec<Shape>,
    pub world_transform: Matrix,
    pub alpha: f32,
    pub blend_mode: BlendMode,
}

impl ShapeDraw {
    pub fn new(shapes: Vec<Shape>, world_transform: Matrix) -> Self {
        Self { shapes, world_transform, alpha: 1.0, blend_mode: BlendMode::Normal }
    }

    /// World-space bounds of every shape.
    pub fn bounds(&self) -> Rect {
        Rect::from_points(
            self.shapes
                .iter()
                .flat_map(|s| s.bounds().corners())
                .map(|p| self.world_transform.apply(p)),
        )
    }
}

/// A textured quad.
///
/// The quad spans `size` local pixels with `anchor` (0..1) at the local origin.
#[derive(Debug, Clone, PartialEq)]
pub struct SpriteDraw {
    pub texture: TextureKey,
    pub world_transform: Matrix,
    pub size: Vec2,
    pub anchor: Vec2,
    /// Sub-rectangle of the texture in normalized coordinates.
    pub frame: Rect,
    pub tint: ColorRgba,
    pub alpha: f32,
    pub blend_mode: BlendMode,
}

impl SpriteDraw {
    pub fn new(texture: TextureKey, size: Vec2, world_transform: Matrix) -> Self {
        Self {
            texture,
            world_transform,
            size,
            anchor: Vec2::zero(),
            frame: Rect::sized(1.0, 1.0),
            tint: ColorRgba::white(),
            alpha: 1.0,
            blend_mode: BlendMode::Normal,
        }
    }

    /// Quad corners in world space, clockwise from the top-left.
    pub fn corners(&self) -> [Vec2; 4] {
        let local = Rect::new(
            -self.anchor.x * self.size.x,
            -self.anchor.y * self.size.y,
            self.size.x,
            self.size.y,
        );
        local.corners().map(|p| self.world_transform.apply(p))
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_points(self.corners())
    }
}
