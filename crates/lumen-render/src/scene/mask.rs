use crate::coords::{ColorRgba, Matrix, Rect, Vec2};
use crate::render::TextureKey;

use super::draw::{ShapeDraw, SpriteDraw};
use super::shape::{Shape, ShapeKind};

/// What a mask is made of.
#[derive(Debug, Clone, PartialEq)]
pub enum MaskSource {
    /// Vector shapes: the union of their fills clips the masked content.
    Shapes(Vec<Shape>),
    /// A sprite whose red channel times alpha scales the masked content.
    Sprite { texture: TextureKey, size: Vec2, anchor: Vec2 },
}

/// A clip region attached to a node.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskShape {
    pub world_transform: Matrix,
    pub source: MaskSource,
    /// Only used by sprite masks.
    pub alpha: f32,
}

impl MaskShape {
    pub fn shapes(shapes: Vec<Shape>, world_transform: Matrix) -> Self {
        Self { world_transform, source: MaskSource::Shapes(shapes), alpha: 1.0 }
    }

    /// Single borderless rectangle.
    pub fn rect(rect: Rect, world_transform: Matrix) -> Self {
        Self::shapes(vec![Shape::rect(rect, ColorRgba::white())], world_transform)
    }

    pub fn sprite(texture: TextureKey, size: Vec2, anchor: Vec2, world_transform: Matrix) -> Self {
        Self { world_transform, source: MaskSource::Sprite { texture, size, anchor }, alpha: 1.0 }
    }

    /// Texture of a sprite mask.
    pub fn texture(&self) -> Option<TextureKey> {
        match self.source {
            MaskSource::Sprite { texture, .. } => Some(texture),
            MaskSource::Shapes(_) => None,
        }
    }

    /// True for exactly one rectangle without a border.
    pub fn is_fast_rect(&self) -> bool {
        match &self.source {
            MaskSource::Shapes(shapes) => {
                matches!(shapes.as_slice(), [s] if matches!(s.kind, ShapeKind::Rect(_)) && s.line_width == 0.0)
            }
            MaskSource::Sprite { .. } => false,
        }
    }

    /// World-space bounds.
    pub fn bounds(&self) -> Rect {
        match &self.source {
            MaskSource::Shapes(_) => self.shape_draw().map(|d| d.bounds()).unwrap_or_default(),
            MaskSource::Sprite { .. } => self.sprite_draw().map(|d| d.bounds()).unwrap_or_default(),
        }
    }

    /// The mask as a shape draw, for stencil rendering.
    pub fn shape_draw(&self) -> Option<ShapeDraw> {
        match &self.source {
            MaskSource::Shapes(shapes) => Some(ShapeDraw::new(shapes.clone(), self.world_transform)),
            MaskSource::Sprite { .. } => None,
        }
    }

    pub fn sprite_draw(&self) -> Option<SpriteDraw> {
        match self.source {
            MaskSource::Sprite { texture, size, anchor } => {
                let mut draw = SpriteDraw::new(texture, size, self.world_transform);
                draw.anchor = anchor;
                draw.alpha = self.alpha;
                Some(draw)
            }
            MaskSource::Shapes(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_rect_requires_a_single_borderless_rect() {
        assert!(MaskShape::rect(Rect::sized(10.0, 10.0), Matrix::IDENTITY).is_fast_rect());

        let bordered = Shape::rect(Rect::sized(10.0, 10.0), ColorRgba::white()).with_line(1.0, ColorRgba::black());
        assert!(!MaskShape::shapes(vec![bordered], Matrix::IDENTITY).is_fast_rect());

        let circle = Shape::circle(Vec2::zero(), 5.0, ColorRgba::white());
        assert!(!MaskShape::shapes(vec![circle], Matrix::IDENTITY).is_fast_rect());

        let two = vec![
            Shape::rect(Rect::sized(1.0, 1.0), ColorRgba::white()),
            Shape::rect(Rect::sized(2.0, 2.0), ColorRgba::white()),
        ];
        assert!(!MaskShape::shapes(two, Matrix::IDENTITY).is_fast_rect());
    }

    #[test]
    fn bounds_are_world_space() {
        let mask = MaskShape::rect(Rect::new(0.0, 0.0, 10.0, 5.0), Matrix::translation(3.0, 4.0));
        assert_eq!(mask.bounds(), Rect::new(3.0, 4.0, 10.0, 5.0));
    }
}
