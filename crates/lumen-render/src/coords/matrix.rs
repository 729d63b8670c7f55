use super::Vec2;

/// 2D affine transform.
///
/// Layout (column vectors):
/// ```text
/// | a  c  tx |
/// | b  d  ty |
/// | 0  0  1  |
/// ```
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);

    #[inline]
    pub const fn new(a: f32, b: f32, c: f32, d: f32, tx: f32, ty: f32) -> Self {
        Self { a, b, c, d, tx, ty }
    }

    #[inline]
    pub fn translation(x: f32, y: f32) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, x, y)
    }

    #[inline]
    pub fn rotation(radians: f32) -> Self {
        let (sin, cos) = radians.sin_cos();
        Self::new(cos, sin, -sin, cos, 0.0, 0.0)
    }

    #[inline]
    pub fn identity(&mut self) -> &mut Self {
        *self = Self::IDENTITY;
        self
    }

    /// Maps a point through the transform.
    #[inline]
    pub fn apply(&self, p: Vec2) -> Vec2 {
        Vec2::new(
            self.a * p.x + self.c * p.y + self.tx,
            self.b * p.x + self.d * p.y + self.ty,
        )
    }

    /// `self = self * other` (other is applied first).
    pub fn append(&mut self, other: &Matrix) -> &mut Self {
        let (a1, b1, c1, d1) = (self.a, self.b, self.c, self.d);

        self.a = other.a * a1 + other.b * c1;
        self.b = other.a * b1 + other.b * d1;
        self.c = other.c * a1 + other.d * c1;
        self.d = other.c * b1 + other.d * d1;
        self.tx = other.tx * a1 + other.ty * c1 + self.tx;
        self.ty = other.tx * b1 + other.ty * d1 + self.ty;
        self
    }

    /// `self = other * self` (self is applied first).
    pub fn prepend(&mut self, other: &Matrix) -> &mut Self {
        let tx1 = self.tx;

        if other.a != 1.0 || other.b != 0.0 || other.c != 0.0 || other.d != 1.0 {
            let a1 = self.a;
            let c1 = self.c;
            self.a = a1 * other.a + self.b * other.c;
            self.b = a1 * other.b + self.b * other.d;
            self.c = c1 * other.a + self.d * other.c;
            self.d = c1 * other.b + self.d * other.d;
        }

        self.tx = tx1 * other.a + self.ty * other.c + other.tx;
        self.ty = tx1 * other.b + self.ty * other.d + other.ty;
        self
    }

    pub fn scale(&mut self, x: f32, y: f32) -> &mut Self {
        self.a *= x;
        self.d *= y;
        self.c *= x;
        self.b *= y;
        self.tx *= x;
        self.ty *= y;
        self
    }

    pub fn translate(&mut self, x: f32, y: f32) -> &mut Self {
        self.tx += x;
        self.ty += y;
        self
    }

    /// Inverts in place. A singular matrix collapses to identity.
    pub fn invert(&mut self) -> &mut Self {
        let (a1, b1, c1, d1, tx1) = (self.a, self.b, self.c, self.d, self.tx);
        let n = a1 * d1 - b1 * c1;
        if n == 0.0 {
            return self.identity();
        }

        self.a = d1 / n;
        self.b = -b1 / n;
        self.c = -c1 / n;
        self.d = a1 / n;
        self.tx = (c1 * self.ty - d1 * tx1) / n;
        self.ty = -(a1 * self.ty - b1 * tx1) / n;
        self
    }

    /// Rotation angle in degrees, rounded to the nearest whole degree.
    #[inline]
    pub fn rotation_degrees(&self) -> i32 {
        self.b.atan2(self.a).to_degrees().round() as i32
    }

    /// True when the x and y basis vectors stay perpendicular.
    #[inline]
    pub fn is_unskewed(&self) -> bool {
        (self.a * self.c + self.b * self.d).abs() <= 1e-4
    }

    /// Column-major 3x3 as three padded columns, matching the WGSL `mat3x3<f32>` layout.
    pub fn to_mat3_columns(&self) -> [[f32; 4]; 3] {
        [
            [self.a, self.b, 0.0, 0.0],
            [self.c, self.d, 0.0, 0.0],
            [self.tx, self.ty, 1.0, 0.0],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn append_applies_other_first() {
        let mut m = Matrix::translation(10.0, 0.0);
        let mut s = Matrix::IDENTITY;
        s.scale(2.0, 2.0);
        m.append(&s);

        let p = m.apply(Vec2::new(1.0, 1.0));
        assert_eq!(p, Vec2::new(12.0, 2.0));
    }

    #[test]
    fn prepend_applies_self_first() {
        let mut m = Matrix::translation(10.0, 0.0);
        let mut s = Matrix::IDENTITY;
        s.scale(2.0, 2.0);
        m.prepend(&s);

        let p = m.apply(Vec2::new(1.0, 1.0));
        assert_eq!(p, Vec2::new(22.0, 2.0));
    }

    #[test]
    fn invert_round_trips_a_point() {
        let mut m = Matrix::rotation(0.7);
        m.translate(5.0, -3.0);
        let mut inv = m;
        inv.invert();

        let p = Vec2::new(4.0, 9.0);
        let back = inv.apply(m.apply(p));
        assert!(close(back.x, p.x) && close(back.y, p.y));
    }

    #[test]
    fn rotation_degrees_and_skew() {
        assert_eq!(Matrix::rotation(std::f32::consts::FRAC_PI_4).rotation_degrees(), 45);
        assert!(Matrix::rotation(1.0).is_unskewed());
        assert!(!Matrix::new(1.0, 0.0, 0.5, 1.0, 0.0, 0.0).is_unskewed());
    }
}
