//! Matrices mapping filter texture coordinates into other spaces.
//!
//! `filter_area` is the source frame of the current filter state and
//! `texture_size` the logical size of its pooled target.

use crate::coords::{Matrix, Rect, Vec2};
use crate::scene::SpriteDraw;

/// Filter uv to world pixels.
pub fn calculate_screen_space_matrix(filter_area: Rect, texture_size: Vec2) -> Matrix {
    let mut m = Matrix::IDENTITY;
    m.translate(filter_area.x() / texture_size.x, filter_area.y() / texture_size.y);
    m.scale(texture_size.x, texture_size.y);
    m
}

/// Filter uv to 0..1 across the filter area.
pub fn calculate_normalized_screen_space_matrix(filter_area: Rect, texture_size: Vec2) -> Matrix {
    let mut m = Matrix::IDENTITY;
    m.translate(filter_area.x() / texture_size.x, filter_area.y() / texture_size.y);
    m.scale(texture_size.x / filter_area.width(), texture_size.y / filter_area.height());
    m
}

/// Filter uv to texture coordinates of `sprite`.
pub fn calculate_sprite_matrix(filter_area: Rect, texture_size: Vec2, sprite: &SpriteDraw) -> Matrix {
    let mut m = Matrix::new(texture_size.x, 0.0, 0.0, texture_size.y, filter_area.x(), filter_area.y());
    let mut inverse = sprite.world_transform;
    inverse.invert();
    m.prepend(&inverse);
    m.scale(1.0 / sprite.size.x, 1.0 / sprite.size.y);
    m.translate(sprite.anchor.x, sprite.anchor.y);
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::TextureKey;

    fn close(p: Vec2, x: f32, y: f32) -> bool {
        (p.x - x).abs() < 1e-4 && (p.y - y).abs() < 1e-4
    }

    #[test]
    fn screen_space_maps_uv_to_world() {
        let m = calculate_screen_space_matrix(Rect::new(10.0, 20.0, 50.0, 50.0), Vec2::new(64.0, 64.0));
        assert!(close(m.apply(Vec2::zero()), 10.0, 20.0));
        assert!(close(m.apply(Vec2::new(0.5, 0.5)), 42.0, 52.0));
    }

    #[test]
    fn normalized_maps_used_area_to_unit_square() {
        let area = Rect::new(0.0, 0.0, 50.0, 25.0);
        let m = calculate_normalized_screen_space_matrix(area, Vec2::new(64.0, 32.0));
        assert!(close(m.apply(Vec2::new(50.0 / 64.0, 25.0 / 32.0)), 1.0, 1.0));
    }

    #[test]
    fn sprite_matrix_lands_on_sprite_uvs() {
        let key = TextureKey::default();
        let mut sprite = SpriteDraw::new(key, Vec2::new(20.0, 10.0), Matrix::translation(30.0, 40.0));
        sprite.anchor = Vec2::new(0.5, 0.5);
        let area = Rect::new(0.0, 0.0, 100.0, 100.0);
        let m = calculate_sprite_matrix(area, Vec2::new(128.0, 128.0), &sprite);

        // World (20, 35) is the sprite's top-left corner.
        assert!(close(m.apply(Vec2::new(20.0 / 128.0, 35.0 / 128.0)), 0.0, 0.0));
        assert!(close(m.apply(Vec2::new(40.0 / 128.0, 45.0 / 128.0)), 1.0, 1.0));
    }
}
