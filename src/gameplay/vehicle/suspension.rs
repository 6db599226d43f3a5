use super::car::CarBody;
use super::wheel::Wheel;
use crate::config::PhysicsConfig;
use bevy::math::Vec2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuspensionSample {
    pub attachment: Vec2,
    pub length: f32,
    /// Positive when extended past the resting length, negative when compressed.
    pub stretch: f32,
    /// Impulse added to the body; the wheel receives the scaled opposite.
    pub force: Vec2,
}

/// Spring length at which the suspension exerts no force.
pub fn resting_length(body: &CarBody, wheel: &Wheel) -> f32 {
    body.height * 0.5 + wheel.padding + wheel.radius
}

/// World-space point on the body the wheel hangs from.
pub fn attachment_point(body: &CarBody, wheel: &Wheel) -> Vec2 {
    let local = Vec2::new(
        -body.width * 0.5 + wheel.padding + wheel.radius + wheel.offset,
        0.0,
    );
    body.position + body.rotation() * local
}

/// Couples one wheel to the body. The wheel is projected back onto the body's
/// down axis at its current distance, then a spring-damper impulse is shared
/// between body and wheel.
pub fn apply_suspension(
    body: &mut CarBody,
    wheel: &mut Wheel,
    physics: &PhysicsConfig,
    dt: f32,
) -> SuspensionSample {
    let down = body.down();
    let attachment = attachment_point(body, wheel);
    let length = wheel.position.distance(attachment);
    let stretch = length - resting_length(body, wheel);

    wheel.position = attachment + down * length;

    let spring_force = stretch * wheel.stiffness * dt;
    let relative_velocity = body.velocity - wheel.velocity;
    let damping_force = relative_velocity * wheel.damping * dt;
    let force = down * spring_force - damping_force;

    body.velocity += force;
    wheel.velocity -= force * physics.wheel_reaction_ratio;

    SuspensionSample {
        attachment,
        length,
        stretch,
        force,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_physics;

    fn body_at(position: Vec2, angle: f32) -> CarBody {
        CarBody {
            position,
            velocity: Vec2::ZERO,
            width: 250.0,
            height: 100.0,
            angle,
        }
    }

    fn wheel_at(position: Vec2, offset: f32) -> Wheel {
        Wheel {
            position,
            velocity: Vec2::ZERO,
            radius: 30.0,
            padding: 10.0,
            stiffness: 100.0,
            damping: 8.0,
            offset,
            on_ground: false,
        }
    }

    #[test]
    fn attachment_points_sit_inside_the_body_corners() {
        let body = body_at(Vec2::new(400.0, 300.0), 0.0);
        let back = wheel_at(Vec2::ZERO, 0.0);
        let front = wheel_at(Vec2::ZERO, 250.0 - 2.0 * (10.0 + 30.0));

        assert!(attachment_point(&body, &back).distance(Vec2::new(315.0, 300.0)) < 1e-3);
        assert!(attachment_point(&body, &front).distance(Vec2::new(485.0, 300.0)) < 1e-3);
        assert_eq!(resting_length(&body, &back), 90.0);
    }

    #[test]
    fn attachment_rotates_with_the_body() {
        let body = body_at(Vec2::new(0.0, 0.0), 90.0);
        let back = wheel_at(Vec2::ZERO, 0.0);

        let attachment = attachment_point(&body, &back);
        let down = body.down();

        assert!(attachment.distance(Vec2::new(0.0, -85.0)) < 1e-3);
        assert!(down.distance(Vec2::new(-1.0, 0.0)) < 1e-5);
    }

    #[test]
    fn wheel_at_rest_receives_no_force() {
        let physics = test_physics();
        let mut body = body_at(Vec2::new(400.0, 300.0), 0.0);
        body.velocity = Vec2::new(12.0, -3.0);
        let mut wheel = wheel_at(Vec2::new(315.0, 390.0), 0.0);
        wheel.velocity = body.velocity;

        let sample = apply_suspension(&mut body, &mut wheel, &physics, 1.0 / 60.0);

        assert!(sample.stretch.abs() < 1e-4);
        assert!(sample.force.length() < 1e-4);
        assert!(body.velocity.distance(Vec2::new(12.0, -3.0)) < 1e-4);
        assert!(wheel.velocity.distance(Vec2::new(12.0, -3.0)) < 1e-4);
    }

    #[test]
    fn wheel_is_projected_onto_the_down_axis() {
        let physics = test_physics();
        let mut body = body_at(Vec2::new(400.0, 300.0), 0.0);
        let mut wheel = wheel_at(Vec2::new(366.0, 368.0), 0.0);

        let sample = apply_suspension(&mut body, &mut wheel, &physics, 1.0 / 60.0);

        assert!((sample.length - 85.0).abs() < 1e-3);
        assert!(wheel.position.distance(Vec2::new(315.0, 385.0)) < 1e-3);
        assert!((sample.stretch + 5.0).abs() < 1e-3);
    }

    #[test]
    fn stretched_spring_pulls_body_down_and_wheel_up() {
        let physics = test_physics();
        let dt = 1.0 / 60.0;
        let mut body = body_at(Vec2::new(400.0, 300.0), 0.0);
        let mut wheel = wheel_at(Vec2::new(315.0, 400.0), 0.0);

        let sample = apply_suspension(&mut body, &mut wheel, &physics, dt);

        let expected = 10.0 * 100.0 * dt;
        assert!((sample.force.y - expected).abs() < 1e-3);
        assert!((body.velocity.y - expected).abs() < 1e-3);
        assert!((wheel.velocity.y + expected * 0.7).abs() < 1e-3);
        assert!(body.velocity.x.abs() < 1e-5);
    }

    #[test]
    fn damping_opposes_relative_motion() {
        let physics = test_physics();
        let dt = 1.0 / 60.0;
        let mut body = body_at(Vec2::new(400.0, 300.0), 0.0);
        body.velocity = Vec2::new(0.0, 120.0);
        let mut wheel = wheel_at(Vec2::new(315.0, 390.0), 0.0);

        apply_suspension(&mut body, &mut wheel, &physics, dt);

        let damping = 120.0 * 8.0 * dt;
        assert!((body.velocity.y - (120.0 - damping)).abs() < 1e-3);
        assert!((wheel.velocity.y - damping * 0.7).abs() < 1e-3);
    }
}
