use bevy::math::Vec2;

/// Horizontal extent below which a segment is treated as vertical.
pub const SEGMENT_VERTICAL_EPSILON: f32 = 1.0e-4;

/// Result of probing a terrain segment at a query point's x coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceProbe {
    /// Point on the segment at the query's horizontal coordinate. For vertical
    /// segments this is the lower endpoint.
    pub surface: Vec2,
    /// Query lies strictly below the surface (larger screen-space y).
    pub below: bool,
}

/// Probes segment `a`-`b` at `point.x`. Returns `None` when the segment does
/// not span the query horizontally.
pub fn probe_segment(a: Vec2, b: Vec2, point: Vec2) -> Option<SurfaceProbe> {
    let span_x = b.x - a.x;

    if span_x.abs() > SEGMENT_VERTICAL_EPSILON {
        let t = (point.x - a.x) / span_x;
        if !(0.0..=1.0).contains(&t) {
            return None;
        }

        let surface = Vec2::new(point.x, a.y + (b.y - a.y) * t);
        return Some(SurfaceProbe {
            surface,
            below: point.y > surface.y,
        });
    }

    if (point.x - a.x).abs() > SEGMENT_VERTICAL_EPSILON {
        return None;
    }

    // Cliff faces resolve to their lower end so a wheel cannot slip through.
    let surface = Vec2::new(a.x, a.y.max(b.y));
    Some(SurfaceProbe {
        surface,
        below: point.y > surface.y,
    })
}

/// Returns the collision point when `point` lies strictly below segment
/// `a`-`b`.
pub fn point_below_line(a: Vec2, b: Vec2, point: Vec2) -> Option<Vec2> {
    probe_segment(a, b, point)
        .filter(|probe| probe.below)
        .map(|probe| probe.surface)
}
