use super::collision::point_below_line;
use super::terrain::TerrainProfile;
use crate::config::PhysicsConfig;
use bevy::math::Vec2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wheel {
    pub position: Vec2,
    pub velocity: Vec2,
    pub radius: f32,
    /// Clearance between the body's lower edge and the tyre.
    pub padding: f32,
    pub stiffness: f32,
    pub damping: f32,
    /// Horizontal offset of this wheel's attachment from the back attachment.
    pub offset: f32,
    pub on_ground: bool,
}

impl Wheel {
    pub fn bottom(&self) -> Vec2 {
        self.position + Vec2::new(0.0, self.radius)
    }
}

/// Moves the wheel by its velocity, then re-derives ground contact against
/// every terrain segment. Returns the surface point of the last contact.
pub fn advance_wheel(
    wheel: &mut Wheel,
    terrain: &TerrainProfile,
    physics: &PhysicsConfig,
    dt: f32,
) -> Option<Vec2> {
    wheel.position += wheel.velocity * dt;
    wheel.on_ground = false;

    let mut contact = None;
    for (a, b) in terrain.segments() {
        let Some(surface) = point_below_line(a, b, wheel.bottom()) else {
            continue;
        };

        wheel.on_ground = true;
        wheel.velocity.y = 0.0;
        // Leave the tyre slightly sunk so the next frame still reports contact.
        wheel.position.y = surface.y - wheel.radius + physics.contact_overlap;
        contact = Some(surface);
    }

    if !wheel.on_ground {
        wheel.velocity.y += physics.gravity * dt;
    }

    contact
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_physics;
    use crate::gameplay::vehicle::terrain::flat_terrain;

    fn test_wheel(position: Vec2, velocity: Vec2) -> Wheel {
        Wheel {
            position,
            velocity,
            radius: 30.0,
            padding: 10.0,
            stiffness: 100.0,
            damping: 8.0,
            offset: 0.0,
            on_ground: false,
        }
    }

    #[test]
    fn falling_wheel_snaps_onto_flat_ground() {
        let physics = test_physics();
        let terrain = flat_terrain(600.0, 10, 40.0);
        let dt = 1.0 / 60.0;

        for downward_speed in [360.0, 600.0, 900.0] {
            let mut wheel = test_wheel(
                Vec2::new(100.0, 600.0 - 30.0 - 4.0),
                Vec2::new(0.0, downward_speed),
            );

            let contact = advance_wheel(&mut wheel, &terrain, &physics, dt);

            assert!(wheel.on_ground);
            assert_eq!(wheel.velocity.y, 0.0);
            assert!((wheel.position.y - (600.0 - 30.0 + 1.0)).abs() < 1e-3);
            assert_eq!(contact.map(|point| point.y), Some(600.0));
        }
    }

    #[test]
    fn airborne_wheel_accelerates_under_gravity() {
        let physics = test_physics();
        let terrain = flat_terrain(600.0, 10, 40.0);
        let dt = 0.01;
        let mut wheel = test_wheel(Vec2::new(100.0, 200.0), Vec2::new(50.0, 0.0));

        let contact = advance_wheel(&mut wheel, &terrain, &physics, dt);

        assert_eq!(contact, None);
        assert!(!wheel.on_ground);
        assert!((wheel.position.x - 100.5).abs() < 1e-4);
        assert!((wheel.velocity.y - physics.gravity * dt).abs() < 1e-3);
    }

    #[test]
    fn contact_flag_is_recomputed_every_frame() {
        let physics = test_physics();
        let terrain = flat_terrain(600.0, 10, 40.0);
        let mut wheel = test_wheel(Vec2::new(100.0, 100.0), Vec2::ZERO);
        wheel.on_ground = true;

        advance_wheel(&mut wheel, &terrain, &physics, 1.0 / 60.0);

        assert!(!wheel.on_ground);
    }

    #[test]
    fn resting_wheel_stays_grounded_with_overlap_bias() {
        let physics = test_physics();
        let terrain = flat_terrain(600.0, 10, 40.0);
        let mut wheel = test_wheel(Vec2::new(100.0, 600.0 - 30.0 + 1.0), Vec2::ZERO);

        for _ in 0..10 {
            advance_wheel(&mut wheel, &terrain, &physics, 1.0 / 60.0);
            assert!(wheel.on_ground);
        }
        assert!((wheel.position.y - 571.0).abs() < 1e-3);
    }

    #[test]
    fn wheel_beyond_terrain_keeps_falling() {
        let physics = test_physics();
        let terrain = flat_terrain(600.0, 4, 40.0);
        let mut wheel = test_wheel(Vec2::new(500.0, 700.0), Vec2::ZERO);

        advance_wheel(&mut wheel, &terrain, &physics, 1.0 / 60.0);

        assert!(!wheel.on_ground);
        assert!(wheel.velocity.y > 0.0);
    }
}
