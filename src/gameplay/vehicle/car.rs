use super::suspension::{apply_suspension, attachment_point, resting_length, SuspensionSample};
use super::terrain::TerrainProfile;
use super::wheel::{advance_wheel, Wheel};
use crate::config::{PhysicsConfig, VehicleConfig};
use bevy::math::{Rot2, Vec2};

/// Logical steering buttons held this frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SteerInput {
    pub left: bool,
    pub right: bool,
}

impl SteerInput {
    /// -1 for left, +1 for right, 0 when neither or both are held.
    fn axis(self) -> f32 {
        (self.right as i32 - self.left as i32) as f32
    }
}

/// Rigid body part of the car. Screen space, angle in degrees (clockwise on
/// screen for positive values).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarBody {
    pub position: Vec2,
    pub velocity: Vec2,
    pub width: f32,
    pub height: f32,
    pub angle: f32,
}

impl CarBody {
    pub fn rotation(&self) -> Rot2 {
        Rot2::radians(self.angle.to_radians())
    }

    pub fn down(&self) -> Vec2 {
        self.rotation() * Vec2::Y
    }

    pub fn half_extents(&self) -> Vec2 {
        Vec2::new(self.width, self.height) * 0.5
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Car {
    pub body: CarBody,
    pub back: Wheel,
    pub front: Wheel,
}

/// Per-wheel outcome of one step, used for telemetry and debug drawing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelStepReport {
    pub contact: Option<Vec2>,
    pub suspension: SuspensionSample,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub back: WheelStepReport,
    pub front: WheelStepReport,
}

impl Car {
    /// Builds a level car centred on `position` with both wheels hanging at
    /// their resting length.
    pub fn from_vehicle(vehicle: &VehicleConfig, position: Vec2) -> Self {
        let wheel = Wheel {
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            radius: vehicle.wheel_radius,
            padding: vehicle.wheel_padding,
            stiffness: vehicle.suspension_stiffness,
            damping: vehicle.suspension_damping,
            offset: 0.0,
            on_ground: false,
        };
        let body = CarBody {
            position,
            velocity: Vec2::ZERO,
            width: vehicle.body_width,
            height: vehicle.body_height,
            angle: 0.0,
        };

        let mut car = Self {
            body,
            back: wheel,
            front: Wheel {
                offset: vehicle.body_width - 2.0 * (vehicle.wheel_padding + vehicle.wheel_radius),
                ..wheel
            },
        };
        car.back.position = car.resting_wheel_position(&car.back);
        car.front.position = car.resting_wheel_position(&car.front);
        car
    }

    fn resting_wheel_position(&self, wheel: &Wheel) -> Vec2 {
        attachment_point(&self.body, wheel) + self.body.down() * resting_length(&self.body, wheel)
    }

    pub fn wheels(&self) -> [&Wheel; 2] {
        [&self.back, &self.front]
    }

    pub fn grounded_wheel_count(&self) -> usize {
        self.wheels().iter().filter(|wheel| wheel.on_ground).count()
    }

    pub fn is_airborne(&self) -> bool {
        self.grounded_wheel_count() == 0
    }

    /// Angle of the back-to-front wheel line in degrees.
    pub fn wheel_line_angle(&self) -> f32 {
        let line = self.front.position - self.back.position;
        line.y.atan2(line.x).to_degrees()
    }

    /// Drive force is applied once per grounded wheel; rotation is only
    /// available while fully airborne.
    pub fn apply_controls(&mut self, input: SteerInput, physics: &PhysicsConfig, dt: f32) {
        let axis = input.axis();
        if axis == 0.0 {
            return;
        }

        let grounded = self.grounded_wheel_count();
        self.body.velocity.x += axis * physics.drive_acceleration * dt * grounded as f32;

        if grounded == 0 {
            self.body.angle += axis * physics.air_rotate_speed * dt;
        }
    }

    pub fn integrate(&mut self, terrain: &TerrainProfile, physics: &PhysicsConfig, dt: f32) {
        self.body.position += self.body.velocity * dt;

        for wheel in [&self.back, &self.front] {
            if !wheel.on_ground {
                continue;
            }
            let slope = terrain.slope_angle_at(wheel.position.x);
            self.body.velocity.x += slope * physics.hill_speed * dt;
            self.body.velocity.x -= self.body.velocity.x * physics.friction * dt;
        }

        let floor = physics.floor_y - self.body.height * 0.5;
        if self.body.position.y > floor {
            self.body.velocity.y = 0.0;
            self.body.position.y = floor;
        } else {
            self.body.velocity.y += physics.gravity * dt;
        }
    }

    /// Eases the body angle toward the wheel line. The easing factor is capped
    /// at one so a long frame cannot overshoot the target.
    pub fn rotate_toward_wheels(&mut self, physics: &PhysicsConfig, dt: f32) {
        let target = self.wheel_line_angle();
        let factor = (physics.rotate_back_speed * dt).clamp(0.0, 1.0);
        self.body.angle += (target - self.body.angle) * factor;
    }

    /// One simulated frame. Suspension runs last so its projection overrides
    /// the wheels' free motion.
    pub fn step(
        &mut self,
        terrain: &TerrainProfile,
        input: SteerInput,
        physics: &PhysicsConfig,
        dt: f32,
    ) -> StepReport {
        self.apply_controls(input, physics, dt);
        self.integrate(terrain, physics, dt);
        self.rotate_toward_wheels(physics, dt);

        let back_contact = advance_wheel(&mut self.back, terrain, physics, dt);
        let front_contact = advance_wheel(&mut self.front, terrain, physics, dt);

        let back_suspension = apply_suspension(&mut self.body, &mut self.back, physics, dt);
        let front_suspension = apply_suspension(&mut self.body, &mut self.front, physics, dt);

        StepReport {
            back: WheelStepReport {
                contact: back_contact,
                suspension: back_suspension,
            },
            front: WheelStepReport {
                contact: front_contact,
                suspension: front_suspension,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{test_physics, test_vehicle};
    use crate::gameplay::vehicle::terrain::flat_terrain;

    const DT: f32 = 1.0 / 60.0;

    fn resting_body_y(ground_y: f32, vehicle: &VehicleConfig) -> f32 {
        ground_y
            - vehicle.wheel_radius
            - (vehicle.body_height * 0.5 + vehicle.wheel_padding + vehicle.wheel_radius)
    }

    #[test]
    fn new_car_hangs_wheels_at_rest_under_each_corner() {
        let vehicle = test_vehicle();
        let car = Car::from_vehicle(&vehicle, Vec2::new(400.0, 300.0));

        assert!(car.back.position.distance(Vec2::new(315.0, 390.0)) < 1e-3);
        assert!(car.front.position.distance(Vec2::new(485.0, 390.0)) < 1e-3);
        assert_eq!(car.front.offset, 170.0);
        assert!(car.wheel_line_angle().abs() < 1e-4);
        assert!(car.is_airborne());
    }

    #[test]
    fn rotation_is_only_allowed_in_the_air() {
        let physics = test_physics();
        let vehicle = test_vehicle();
        let right = SteerInput {
            left: false,
            right: true,
        };

        let mut airborne = Car::from_vehicle(&vehicle, Vec2::new(400.0, 300.0));
        airborne.apply_controls(right, &physics, DT);
        assert!((airborne.body.angle - physics.air_rotate_speed * DT).abs() < 1e-4);
        assert_eq!(airborne.body.velocity.x, 0.0);

        let mut grounded = Car::from_vehicle(&vehicle, Vec2::new(400.0, 300.0));
        grounded.back.on_ground = true;
        grounded.apply_controls(right, &physics, DT);
        assert_eq!(grounded.body.angle, 0.0);
        assert!((grounded.body.velocity.x - physics.drive_acceleration * DT).abs() < 1e-3);
    }

    #[test]
    fn both_grounded_wheels_contribute_drive() {
        let physics = test_physics();
        let mut car = Car::from_vehicle(&test_vehicle(), Vec2::new(400.0, 300.0));
        car.back.on_ground = true;
        car.front.on_ground = true;

        car.apply_controls(
            SteerInput {
                left: true,
                right: false,
            },
            &physics,
            DT,
        );

        assert!((car.body.velocity.x + 2.0 * physics.drive_acceleration * DT).abs() < 1e-3);
    }

    #[test]
    fn opposing_buttons_cancel() {
        let physics = test_physics();
        let mut car = Car::from_vehicle(&test_vehicle(), Vec2::new(400.0, 300.0));

        car.apply_controls(
            SteerInput {
                left: true,
                right: true,
            },
            &physics,
            DT,
        );

        assert_eq!(car.body.angle, 0.0);
    }

    #[test]
    fn floor_clamp_zeroes_vertical_velocity() {
        let physics = test_physics();
        let terrain = flat_terrain(900.0, 10, 40.0);
        let mut car = Car::from_vehicle(&test_vehicle(), Vec2::new(200.0, 749.0));
        car.body.velocity.y = 300.0;

        car.integrate(&terrain, &physics, DT);

        assert_eq!(car.body.position.y, physics.floor_y - 50.0);
        assert_eq!(car.body.velocity.y, 0.0);
    }

    #[test]
    fn airborne_body_gains_gravity() {
        let physics = test_physics();
        let terrain = flat_terrain(900.0, 10, 40.0);
        let mut car = Car::from_vehicle(&test_vehicle(), Vec2::new(200.0, 100.0));

        car.integrate(&terrain, &physics, DT);

        assert!((car.body.velocity.y - physics.gravity * DT).abs() < 1e-3);
    }

    #[test]
    fn uphill_slope_slows_grounded_car() {
        let physics = test_physics();
        let terrain = TerrainProfile::new(
            (0..10)
                .map(|index| Vec2::new(index as f32 * 40.0, 700.0 - index as f32 * 20.0))
                .collect(),
            40.0,
        )
        .expect("ramp is well formed");
        let mut car = Car::from_vehicle(&test_vehicle(), Vec2::new(200.0, 300.0));
        car.back.on_ground = true;
        car.body.velocity.x = 100.0;

        car.integrate(&terrain, &physics, DT);

        assert!(car.body.velocity.x < 100.0 * (1.0 - physics.friction * DT));
    }

    #[test]
    fn integrate_survives_wheels_past_terrain_end() {
        let physics = test_physics();
        let terrain = flat_terrain(600.0, 4, 40.0);
        let mut car = Car::from_vehicle(&test_vehicle(), Vec2::new(5_000.0, 300.0));
        car.back.on_ground = true;
        car.front.on_ground = true;
        car.body.velocity.x = 50.0;

        car.integrate(&terrain, &physics, DT);

        assert!(car.body.velocity.x.is_finite());
        assert!(car.body.velocity.x < 50.0);
    }

    #[test]
    fn orientation_converges_monotonically_without_overshoot() {
        let physics = test_physics();
        let mut car = Car::from_vehicle(&test_vehicle(), Vec2::new(400.0, 300.0));
        car.back.position = Vec2::new(0.0, 0.0);
        car.front.position = Vec2::new(100.0, 100.0);
        let target = car.wheel_line_angle();
        assert!((target - 45.0).abs() < 1e-3);

        let mut previous_gap = (target - car.body.angle).abs();
        for _ in 0..600 {
            car.rotate_toward_wheels(&physics, DT);
            let gap = target - car.body.angle;
            assert!(gap >= 0.0, "easing overshot the wheel line");
            assert!(gap.abs() <= previous_gap);
            previous_gap = gap.abs();
        }
        assert!(previous_gap < 1e-2);
    }

    #[test]
    fn long_frames_do_not_overshoot_orientation() {
        let physics = test_physics();
        let mut car = Car::from_vehicle(&test_vehicle(), Vec2::new(400.0, 300.0));
        car.back.position = Vec2::new(0.0, 0.0);
        car.front.position = Vec2::new(100.0, -100.0);

        car.rotate_toward_wheels(&physics, 2.0);

        assert!((car.body.angle + 45.0).abs() < 1e-3);
    }

    #[test]
    fn dropped_car_settles_level_on_flat_ground() {
        let physics = test_physics();
        let vehicle = test_vehicle();
        let ground_y = 600.0;
        let terrain = flat_terrain(ground_y, 60, 40.0);
        let rest_y = resting_body_y(ground_y, &vehicle);
        let mut car = Car::from_vehicle(
            &vehicle,
            Vec2::new(400.0, rest_y - vehicle.body_height * 0.5),
        );

        for _ in 0..900 {
            car.step(&terrain, SteerInput::default(), &physics, DT);
        }

        assert!(car.back.on_ground);
        assert!(car.front.on_ground);
        assert!(car.body.angle.abs() < 1e-2);
        assert!(car.body.velocity.x.abs() < 1e-2);
        assert!(car.body.velocity.y.abs() < 1.0);
        assert!(car.body.position.y < rest_y + vehicle.body_height * 0.5);
    }

    #[test]
    fn sideways_drift_and_tilt_decay_on_flat_ground() {
        let physics = test_physics();
        let vehicle = test_vehicle();
        let ground_y = 600.0;
        let terrain = flat_terrain(ground_y, 100, 40.0);
        let rest_y = resting_body_y(ground_y, &vehicle);
        let mut car = Car::from_vehicle(
            &vehicle,
            Vec2::new(400.0, rest_y - vehicle.body_height * 0.5),
        );
        car.body.velocity.x = 150.0;
        car.body.angle = 12.0;

        for _ in 0..1200 {
            car.step(&terrain, SteerInput::default(), &physics, DT);
        }

        assert!(car.back.on_ground && car.front.on_ground);
        assert!(car.body.angle.abs() < 0.05);
        assert!(car.body.velocity.x.abs() < 0.5);
    }

    #[test]
    fn step_reports_contacts_and_suspension() {
        let physics = test_physics();
        let vehicle = test_vehicle();
        let terrain = flat_terrain(600.0, 60, 40.0);
        let start = Vec2::new(400.0, resting_body_y(600.0, &vehicle));
        let mut car = Car::from_vehicle(&vehicle, start);

        let mut report = car.step(&terrain, SteerInput::default(), &physics, DT);
        for _ in 0..5 {
            report = car.step(&terrain, SteerInput::default(), &physics, DT);
        }

        assert_eq!(report.back.contact.map(|point| point.y), Some(600.0));
        assert_eq!(report.front.contact.map(|point| point.y), Some(600.0));
        assert!(report.back.suspension.attachment.distance(car.body.position) > 0.0);
    }
}
