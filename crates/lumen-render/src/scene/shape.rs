use crate::coords::{ColorRgba, Matrix, Rect, Vec2};

const CIRCLE_SEGMENTS: usize = 40;

/// Outline of a shape in local space.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeKind {
    Rect(Rect),
    /// Convex polygon, points in order.
    Polygon(Vec<Vec2>),
    Circle { center: Vec2, radius: f32 },
}

/// A filled (and optionally stroked) vector shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub kind: ShapeKind,
    pub fill: ColorRgba,
    /// Stroke width in local pixels; zero draws no border.
    pub line_width: f32,
    pub line_color: ColorRgba,
}

impl Shape {
    pub fn new(kind: ShapeKind, fill: ColorRgba) -> Self {
        Self { kind, fill, line_width: 0.0, line_color: ColorRgba::black() }
    }

    #[inline]
    pub fn rect(rect: Rect, fill: ColorRgba) -> Self {
        Self::new(ShapeKind::Rect(rect), fill)
    }

    #[inline]
    pub fn polygon(points: Vec<Vec2>, fill: ColorRgba) -> Self {
        Self::new(ShapeKind::Polygon(points), fill)
    }

    #[inline]
    pub fn circle(center: Vec2, radius: f32, fill: ColorRgba) -> Self {
        Self::new(ShapeKind::Circle { center, radius }, fill)
    }

    pub fn with_line(mut self, width: f32, color: ColorRgba) -> Self {
        self.line_width = width.max(0.0);
        self.line_color = color;
        self
    }

    /// Outline points in local space, closed implicitly.
    pub fn outline(&self) -> Vec<Vec2> {
        match &self.kind {
            ShapeKind::Rect(r) => r.normalized().corners().to_vec(),
            ShapeKind::Polygon(points) => points.clone(),
            ShapeKind::Circle { center, radius } => (0..CIRCLE_SEGMENTS)
                .map(|i| {
                    let t = i as f32 / CIRCLE_SEGMENTS as f32 * std::f32::consts::TAU;
                    Vec2::new(center.x + radius * t.cos(), center.y + radius * t.sin())
                })
                .collect(),
        }
    }

    /// Local bounds including half the stroke.
    pub fn bounds(&self) -> Rect {
        let r = match &self.kind {
            ShapeKind::Rect(r) => r.normalized(),
            ShapeKind::Circle { center, radius } => {
                Rect::new(center.x - radius, center.y - radius, radius * 2.0, radius * 2.0)
            }
            ShapeKind::Polygon(points) => Rect::from_points(points.iter().copied()),
        };
        if self.line_width > 0.0 { r.pad(self.line_width * 0.5) } else { r }
    }

    /// Appends the fill as a triangle fan, transformed into world space.
    pub fn fill_geometry(&self, world: &Matrix, positions: &mut Vec<Vec2>, indices: &mut Vec<u16>) {
        let outline = self.outline();
        if outline.len() < 3 {
            return;
        }
        let base = positions.len() as u16;
        positions.extend(outline.iter().map(|p| world.apply(*p)));
        for i in 1..outline.len() as u16 - 1 {
            indices.extend_from_slice(&[base, base + i, base + i + 1]);
        }
    }

    /// Appends one quad per outline edge, `line_width` wide and centered on the edge.
    pub fn stroke_geometry(&self, world: &Matrix, positions: &mut Vec<Vec2>, indices: &mut Vec<u16>) {
        if self.line_width <= 0.0 {
            return;
        }
        let outline = self.outline();
        let half = self.line_width * 0.5;
        for (i, &p0) in outline.iter().enumerate() {
            let p1 = outline[(i + 1) % outline.len()];
            let d = p1 - p0;
            let len = (d.x * d.x + d.y * d.y).sqrt();
            if len == 0.0 {
                continue;
            }
            let n = Vec2::new(-d.y / len * half, d.x / len * half);
            let base = positions.len() as u16;
            positions.extend([p0 + n, p1 + n, p1 - n, p0 - n].map(|p| world.apply(p)));
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_fill_is_two_triangles() {
        let shape = Shape::rect(Rect::new(0.0, 0.0, 10.0, 10.0), ColorRgba::white());
        let (mut pos, mut idx) = (Vec::new(), Vec::new());
        shape.fill_geometry(&Matrix::translation(5.0, 0.0), &mut pos, &mut idx);
        assert_eq!(pos.len(), 4);
        assert_eq!(idx, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(pos[0], Vec2::new(5.0, 0.0));
    }

    #[test]
    fn stroke_widens_bounds() {
        let shape = Shape::rect(Rect::new(0.0, 0.0, 10.0, 10.0), ColorRgba::white()).with_line(2.0, ColorRgba::black());
        assert_eq!(shape.bounds(), Rect::new(-1.0, -1.0, 12.0, 12.0));

        let (mut pos, mut idx) = (Vec::new(), Vec::new());
        shape.stroke_geometry(&Matrix::IDENTITY, &mut pos, &mut idx);
        assert_eq!(pos.len(), 16);
        assert_eq!(idx.len(), 24);
    }

    #[test]
    fn degenerate_polygons_emit_nothing() {
        let shape = Shape::polygon(vec![Vec2::zero(), Vec2::new(1.0, 1.0)], ColorRgba::white());
        let (mut pos, mut idx) = (Vec::new(), Vec::new());
        shape.fill_geometry(&Matrix::IDENTITY, &mut pos, &mut idx);
        assert!(pos.is_empty() && idx.is_empty());
    }
}
