use super::Vec2;

/// Axis-aligned rectangle in world pixels (top-left origin).
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Rect {
    pub origin: Vec2,
    pub size: Vec2,
}

impl Rect {
    #[inline]
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            origin: Vec2::new(x, y),
            size: Vec2::new(w, h),
        }
    }

    #[inline]
    pub const fn from_origin_size(origin: Vec2, size: Vec2) -> Self {
        Self { origin, size }
    }

    /// Rectangle anchored at the origin with the given size.
    #[inline]
    pub const fn sized(w: f32, h: f32) -> Self {
        Self::new(0.0, 0.0, w, h)
    }

    /// Smallest rectangle enclosing every point; empty input gives a zero rect.
    pub fn from_points(points: impl IntoIterator<Item = Vec2>) -> Self {
        let mut iter = points.into_iter();
        let Some(first) = iter.next() else {
            return Rect::default();
        };

        let (mut min, mut max) = (first, first);
        for p in iter {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }

        Rect::new(min.x, min.y, max.x - min.x, max.y - min.y)
    }

    #[inline]
    pub fn x(self) -> f32 {
        self.origin.x
    }

    #[inline]
    pub fn y(self) -> f32 {
        self.origin.y
    }

    #[inline]
    pub fn width(self) -> f32 {
        self.size.x
    }

    #[inline]
    pub fn height(self) -> f32 {
        self.size.y
    }

    #[inline]
    pub fn min(self) -> Vec2 {
        self.origin
    }

    #[inline]
    pub fn max(self) -> Vec2 {
        Vec2::new(self.origin.x + self.size.x, self.origin.y + self.size.y)
    }

    /// Corners in clockwise order starting at the top-left.
    #[inline]
    pub fn corners(self) -> [Vec2; 4] {
        let Vec2 { x, y } = self.origin;
        let Vec2 { x: w, y: h } = self.size;
        [
            Vec2::new(x, y),
            Vec2::new(x + w, y),
            Vec2::new(x + w, y + h),
            Vec2::new(x, y + h),
        ]
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.size.x <= 0.0 || self.size.y <= 0.0
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.origin.is_finite() && self.size.is_finite()
    }

    /// Normalizes the rectangle so width/height are non-negative.
    #[inline]
    pub fn normalized(self) -> Self {
        let mut x = self.origin.x;
        let mut y = self.origin.y;
        let mut w = self.size.x;
        let mut h = self.size.y;

        if w < 0.0 {
            x += w;
            w = -w;
        }
        if h < 0.0 {
            y += h;
            h = -h;
        }

        Rect::new(x, y, w, h)
    }

    /// Half-open containment: [min, max).
    #[inline]
    pub fn contains(self, p: Vec2) -> bool {
        let r = self.normalized();
        p.x >= r.origin.x
            && p.y >= r.origin.y
            && p.x < (r.origin.x + r.size.x)
            && p.y < (r.origin.y + r.size.y)
    }

    #[inline]
    pub fn intersect(self, other: Rect) -> Option<Rect> {
        let a = self.normalized();
        let b = other.normalized();

        let x0 = a.origin.x.max(b.origin.x);
        let y0 = a.origin.y.max(b.origin.y);
        let x1 = (a.origin.x + a.size.x).min(b.origin.x + b.size.x);
        let y1 = (a.origin.y + a.size.y).min(b.origin.y + b.size.y);

        let w = x1 - x0;
        let h = y1 - y0;

        if w <= 0.0 || h <= 0.0 {
            None
        } else {
            Some(Rect::new(x0, y0, w, h))
        }
    }

    /// Clamps this rectangle into `bounds`, shrinking width/height to zero at worst.
    ///
    /// Unlike [`intersect`](Self::intersect) the result always exists, which is what
    /// frame fitting needs: an off-target node still yields a (degenerate) frame.
    pub fn fit(self, bounds: Rect) -> Rect {
        let mut r = self;

        if r.origin.x < bounds.origin.x {
            r.size.x += r.origin.x - bounds.origin.x;
            if r.size.x < 0.0 {
                r.size.x = 0.0;
            }
            r.origin.x = bounds.origin.x;
        }

        if r.origin.y < bounds.origin.y {
            r.size.y += r.origin.y - bounds.origin.y;
            if r.size.y < 0.0 {
                r.size.y = 0.0;
            }
            r.origin.y = bounds.origin.y;
        }

        if r.origin.x + r.size.x > bounds.origin.x + bounds.size.x {
            r.size.x = (bounds.origin.x + bounds.size.x - r.origin.x).max(0.0);
        }

        if r.origin.y + r.size.y > bounds.origin.y + bounds.size.y {
            r.size.y = (bounds.origin.y + bounds.size.y - r.origin.y).max(0.0);
        }

        r
    }

    /// Grows the rectangle outward by `padding` on every side.
    #[inline]
    pub fn pad(self, padding: f32) -> Rect {
        Rect::new(
            self.origin.x - padding,
            self.origin.y - padding,
            self.size.x + padding * 2.0,
            self.size.y + padding * 2.0,
        )
    }

    /// Snaps every component down onto the pixel grid of `resolution`.
    #[inline]
    pub fn floor_to_resolution(self, resolution: f32) -> Rect {
        let snap = |v: f32| (v * resolution).trunc() / resolution;
        Rect::new(
            snap(self.origin.x),
            snap(self.origin.y),
            snap(self.size.x),
            snap(self.size.y),
        )
    }
}
