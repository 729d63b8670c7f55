use crate::coords::{Rect, Vec2};
use crate::device::Vertex;

pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

/// Full-screen quad used by every filter pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct Quad {
    vertices: [Vertex; 4],
}

impl Quad {
    /// Covers `frame` in world space; texture coordinates run from 0 to the part
    /// of a `texture_size` target that `frame` occupies.
    pub fn map(&mut self, texture_size: Vec2, frame: Rect) {
        let u = frame.width() / texture_size.x;
        let v = frame.height() / texture_size.y;
        let uvs = [[0.0, 0.0], [u, 0.0], [u, v], [0.0, v]];
        for ((vertex, corner), uv) in self.vertices.iter_mut().zip(frame.corners()).zip(uvs) {
            *vertex = Vertex::new([corner.x, corner.y], uv, [1.0; 4]);
        }
    }

    #[inline]
    pub fn vertices(&self) -> &[Vertex; 4] {
        &self.vertices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_covers_the_frame_and_scales_uvs() {
        let mut quad = Quad::default();
        quad.map(Vec2::new(128.0, 64.0), Rect::new(10.0, 20.0, 64.0, 32.0));

        let v = quad.vertices();
        assert_eq!(v[0].position, [10.0, 20.0]);
        assert_eq!(v[2].position, [74.0, 52.0]);
        assert_eq!(v[2].uv, [0.5, 0.5]);
        assert_eq!(v[3].uv, [0.0, 0.5]);
    }
}
