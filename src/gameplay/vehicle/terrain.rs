use crate::config::TerrainConfig;
use bevy::math::Vec2;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Piecewise-linear ground profile sampled at a fixed horizontal spacing.
/// Screen space: larger y is lower on screen.
#[derive(Debug, Clone)]
pub struct TerrainProfile {
    points: Vec<Vec2>,
    spacing: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TerrainError {
    TooFewPoints { count: usize },
    NonPositiveSpacing { spacing: f32 },
    NonIncreasing { index: usize },
}

impl Display for TerrainError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooFewPoints { count } => {
                write!(f, "terrain needs at least 2 points (got {count})")
            }
            Self::NonPositiveSpacing { spacing } => {
                write!(f, "terrain spacing must be > 0 (got {spacing})")
            }
            Self::NonIncreasing { index } => {
                write!(f, "terrain point {index} does not advance to the right")
            }
        }
    }
}

impl Error for TerrainError {}

impl TerrainProfile {
    pub fn new(points: Vec<Vec2>, spacing: f32) -> Result<Self, TerrainError> {
        if points.len() < 2 {
            return Err(TerrainError::TooFewPoints {
                count: points.len(),
            });
        }
        if spacing.is_nan() || spacing <= 0.0 {
            return Err(TerrainError::NonPositiveSpacing { spacing });
        }
        if let Some(index) = points
            .windows(2)
            .position(|pair| pair[1].x <= pair[0].x)
        {
            return Err(TerrainError::NonIncreasing { index: index + 1 });
        }

        Ok(Self { points, spacing })
    }

    pub fn points(&self) -> &[Vec2] {
        &self.points
    }

    pub fn segment_count(&self) -> usize {
        self.points.len() - 1
    }

    pub fn segments(&self) -> impl Iterator<Item = (Vec2, Vec2)> + '_ {
        self.points.windows(2).map(|pair| (pair[0], pair[1]))
    }

    /// Index of the segment under `x`, clamped to the first/last segment
    /// outside the sampled range.
    pub fn segment_index_at(&self, x: f32) -> usize {
        let raw = (x / self.spacing).floor();
        if raw.is_nan() || raw < 0.0 {
            return 0;
        }
        (raw as usize).min(self.segment_count() - 1)
    }

    pub fn segment_at(&self, x: f32) -> (Vec2, Vec2) {
        let index = self.segment_index_at(x);
        (self.points[index], self.points[index + 1])
    }

    /// Slope of the segment under `x` in radians. Negative when the ground
    /// rises to the right.
    pub fn slope_angle_at(&self, x: f32) -> f32 {
        let (a, b) = self.segment_at(x);
        (b.y - a.y).atan2(b.x - a.x)
    }

    /// Surface height under `x`, holding the end heights outside the range.
    pub fn height_at(&self, x: f32) -> f32 {
        let (a, b) = self.segment_at(x);
        let t = ((x - a.x) / (b.x - a.x)).clamp(0.0, 1.0);
        a.y + (b.y - a.y) * t
    }

    pub fn width(&self) -> f32 {
        self.points[self.points.len() - 1].x - self.points[0].x
    }
}

/// Builds terrain by a bounded random walk. The same seed always yields the
/// same profile.
pub fn generate_random_walk(config: &TerrainConfig) -> Result<TerrainProfile, TerrainError> {
    let mut seed = config.seed;
    let mut y = config.start_y;
    let mut points = Vec::with_capacity(config.point_count);

    for index in 0..config.point_count {
        if index >= config.flat_lead_in.max(1) {
            y = (y + next_signed_unit_random(&mut seed) * config.max_step)
                .clamp(config.min_y, config.max_y);
        }
        points.push(Vec2::new(index as f32 * config.spacing, y));
    }

    TerrainProfile::new(points, config.spacing)
}

fn next_signed_unit_random(seed: &mut u64) -> f32 {
    (next_unit_random(seed) * 2.0) - 1.0
}

fn next_unit_random(seed: &mut u64) -> f32 {
    *seed = seed
        .wrapping_mul(6_364_136_223_846_793_005)
        .wrapping_add(1_442_695_040_888_963_407);
    ((*seed >> 32) as u32) as f32 / u32::MAX as f32
}

#[cfg(test)]
pub(crate) fn flat_terrain(height: f32, point_count: usize, spacing: f32) -> TerrainProfile {
    let points = (0..point_count)
        .map(|index| Vec2::new(index as f32 * spacing, height))
        .collect();
    TerrainProfile::new(points, spacing).expect("flat terrain is well formed")
}
