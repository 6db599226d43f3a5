use crate::config::{CameraConfig, ConfigReloadedEvent, GameConfig, VehicleConfig};
use crate::states::{GameState, RunRestartRequested};
use bevy::prelude::*;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod car;
mod collision;
mod scene;
mod suspension;
mod terrain;
mod wheel;

pub use car::{Car, SteerInput, StepReport, WheelStepReport};
pub use terrain::{generate_random_walk, TerrainError, TerrainProfile};

use scene::{despawn_run_scene, spawn_run_scene, sync_vehicle_visuals, RunSceneEntity};
use wheel::Wheel;

const TERRAIN_Z: f32 = 0.0;
const TERRAIN_RIDGE_Z: f32 = 0.5;
const CAR_BODY_Z: f32 = 1.0;
const WHEEL_Z: f32 = 2.0;
const TERRAIN_EXTRUSION_DEPTH: f32 = 900.0;
const TERRAIN_RIDGE_HEIGHT: f32 = 6.0;
const CAMERA_Z: f32 = 999.9;

pub struct VehicleGameplayPlugin;

impl Plugin for VehicleGameplayPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<VehicleInputState>()
            .init_resource::<VehicleInputBindings>()
            .init_resource::<VehicleTelemetry>()
            .init_resource::<CameraZoomState>()
            .add_systems(OnEnter(GameState::InRun), start_run)
            .add_systems(
                Update,
                (restart_run_on_request, sync_live_suspension_tuning)
                    .chain()
                    .run_if(resource_exists::<GameConfig>)
                    .run_if(resource_exists::<VehicleSim>),
            )
            .add_systems(
                Update,
                (
                    read_vehicle_input,
                    step_vehicle_simulation,
                    update_vehicle_telemetry,
                    sync_vehicle_visuals,
                    camera_follow_vehicle,
                )
                    .chain()
                    .after(sync_live_suspension_tuning)
                    .run_if(in_state(GameState::InRun))
                    .run_if(resource_exists::<GameConfig>)
                    .run_if(resource_exists::<VehicleSim>),
            );
    }
}

/// Maps screen space (+y down) to Bevy world space (+y up).
pub fn screen_to_world(point: Vec2) -> Vec2 {
    Vec2::new(point.x, -point.y)
}

/// Everything the running simulation owns. The car is stepped once per frame
/// against the terrain it was spawned on.
#[derive(Resource, Debug, Clone)]
pub struct VehicleSim {
    pub vehicle_id: String,
    pub car: Car,
    pub terrain: TerrainProfile,
    pub last_report: Option<StepReport>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunSetupError {
    UnknownVehicle(String),
    Terrain(TerrainError),
}

impl Display for RunSetupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownVehicle(id) => write!(f, "active vehicle `{id}` is not configured"),
            Self::Terrain(error) => write!(f, "terrain generation failed: {error}"),
        }
    }
}

impl Error for RunSetupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::UnknownVehicle(_) => None,
            Self::Terrain(error) => Some(error),
        }
    }
}

impl From<TerrainError> for RunSetupError {
    fn from(error: TerrainError) -> Self {
        Self::Terrain(error)
    }
}

impl VehicleSim {
    pub fn from_config(config: &GameConfig) -> Result<Self, RunSetupError> {
        let vehicle = config.active_vehicle().ok_or_else(|| {
            RunSetupError::UnknownVehicle(config.game.app.default_vehicle.clone())
        })?;
        let terrain = generate_random_walk(&config.terrain.terrain)?;
        let car = Car::from_vehicle(vehicle, spawn_position(vehicle, &terrain));

        Ok(Self {
            vehicle_id: vehicle.id.clone(),
            car,
            terrain,
            last_report: None,
        })
    }
}

/// Body centre that leaves the tyres `spawn_drop_height` above the ground at
/// `spawn_x`.
fn spawn_position(vehicle: &VehicleConfig, terrain: &TerrainProfile) -> Vec2 {
    let hang = vehicle.body_height * 0.5 + vehicle.wheel_padding + vehicle.wheel_radius;
    let ground = terrain.height_at(vehicle.spawn_x);
    Vec2::new(
        vehicle.spawn_x,
        ground - vehicle.wheel_radius - hang - vehicle.spawn_drop_height,
    )
}

#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct VehicleInputState {
    pub steer: SteerInput,
}

#[derive(Resource, Debug, Clone)]
struct VehicleInputBindings {
    steer_right: Vec<KeyCode>,
    steer_left: Vec<KeyCode>,
}

impl Default for VehicleInputBindings {
    fn default() -> Self {
        Self {
            steer_right: vec![KeyCode::KeyD, KeyCode::ArrowRight],
            steer_left: vec![KeyCode::KeyA, KeyCode::ArrowLeft],
        }
    }
}

#[derive(Resource, Debug, Clone, Default)]
pub struct VehicleTelemetry {
    pub distance_px: f32,
    pub speed_px_s: f32,
    pub max_speed_px_s: f32,
    pub body_angle_deg: f32,
    pub back_grounded: bool,
    pub front_grounded: bool,
    pub back_stretch_px: f32,
    pub front_stretch_px: f32,
    pub airtime_current_s: f32,
    pub airtime_best_s: f32,
    pub landing_count: u32,
    pub last_landing_speed_px_s: f32,
    start_x: f32,
    was_airborne: bool,
    fall_speed_px_s: f32,
}

/// Returned by [`VehicleTelemetry::record_step`] when a step ends an airborne
/// stretch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landing {
    pub airtime_s: f32,
    pub impact_speed_px_s: f32,
}

impl VehicleTelemetry {
    pub fn starting_at(start_x: f32) -> Self {
        Self {
            start_x,
            ..default()
        }
    }

    pub fn record_step(&mut self, car: &Car, report: &StepReport, dt: f32) -> Option<Landing> {
        self.distance_px = (car.body.position.x - self.start_x).max(0.0);
        self.speed_px_s = car.body.velocity.x;
        self.max_speed_px_s = self.max_speed_px_s.max(car.body.velocity.x.abs());
        self.body_angle_deg = car.body.angle;
        self.back_grounded = car.back.on_ground;
        self.front_grounded = car.front.on_ground;
        self.back_stretch_px = report.back.suspension.stretch;
        self.front_stretch_px = report.front.suspension.stretch;

        let airborne = car.is_airborne();
        let mut landing = None;
        if airborne {
            self.airtime_current_s += dt;
            self.airtime_best_s = self.airtime_best_s.max(self.airtime_current_s);
        } else {
            if self.was_airborne {
                self.landing_count = self.landing_count.saturating_add(1);
                self.last_landing_speed_px_s = self.fall_speed_px_s;
                landing = Some(Landing {
                    airtime_s: self.airtime_current_s,
                    impact_speed_px_s: self.fall_speed_px_s,
                });
            }
            self.airtime_current_s = 0.0;
        }

        self.was_airborne = airborne;
        self.fall_speed_px_s = car.body.velocity.y.max(0.0);
        landing
    }
}

#[derive(Resource, Debug, Clone, Copy)]
pub struct CameraZoomState {
    pub zoom: f32,
}

impl Default for CameraZoomState {
    fn default() -> Self {
        Self { zoom: 1.0 }
    }
}

/// Zooms out as horizontal speed grows, within the configured range.
pub fn target_zoom(speed_px_s: f32, camera: &CameraConfig) -> f32 {
    (camera.max_zoom - speed_px_s.abs() * camera.zoom_speed_factor)
        .clamp(camera.min_zoom, camera.max_zoom)
}

fn ease_zoom(current: f32, target: f32, easing: f32, dt: f32) -> f32 {
    current + (target - current) * (easing * dt).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Serialize)]
pub struct WheelSnapshot {
    pub axle: &'static str,
    pub position: [f32; 2],
    pub velocity: [f32; 2],
    pub on_ground: bool,
    pub suspension_length: Option<f32>,
    pub suspension_stretch: Option<f32>,
}

/// Serializable dump of the running car, logged on demand from the debug
/// overlay.
#[derive(Debug, Clone, Serialize)]
pub struct VehicleSnapshot {
    pub vehicle_id: String,
    pub body_position: [f32; 2],
    pub body_velocity: [f32; 2],
    pub body_angle_deg: f32,
    pub wheel_line_angle_deg: f32,
    pub wheels: [WheelSnapshot; 2],
    pub distance_px: f32,
    pub airtime_best_s: f32,
    pub landing_count: u32,
}

impl VehicleSnapshot {
    pub fn capture(sim: &VehicleSim, telemetry: &VehicleTelemetry) -> Self {
        let car = &sim.car;
        let wheel_snapshot = |axle: &'static str, wheel: &Wheel, report: Option<&WheelStepReport>| {
            WheelSnapshot {
                axle,
                position: wheel.position.to_array(),
                velocity: wheel.velocity.to_array(),
                on_ground: wheel.on_ground,
                suspension_length: report.map(|report| report.suspension.length),
                suspension_stretch: report.map(|report| report.suspension.stretch),
            }
        };
        let report = sim.last_report.as_ref();

        Self {
            vehicle_id: sim.vehicle_id.clone(),
            body_position: car.body.position.to_array(),
            body_velocity: car.body.velocity.to_array(),
            body_angle_deg: car.body.angle,
            wheel_line_angle_deg: car.wheel_line_angle(),
            wheels: [
                wheel_snapshot("back", &car.back, report.map(|report| &report.back)),
                wheel_snapshot("front", &car.front, report.map(|report| &report.front)),
            ],
            distance_px: telemetry.distance_px,
            airtime_best_s: telemetry.airtime_best_s,
            landing_count: telemetry.landing_count,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn start_run(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<ColorMaterial>>,
    config: Res<GameConfig>,
    existing: Option<Res<VehicleSim>>,
    mut telemetry: ResMut<VehicleTelemetry>,
    mut zoom: ResMut<CameraZoomState>,
) {
    // Resuming from pause keeps the current run.
    if existing.is_some() {
        return;
    }

    let sim = match VehicleSim::from_config(&config) {
        Ok(sim) => sim,
        Err(error) => {
            error!("Could not start run: {error}");
            return;
        }
    };

    spawn_run_scene(&mut commands, &mut meshes, &mut materials, &sim);
    *telemetry = VehicleTelemetry::starting_at(sim.car.body.position.x);
    zoom.zoom = config.game.camera.max_zoom;
    info!(
        "Run started with `{}` over {} terrain segments ({:.0}px).",
        sim.vehicle_id,
        sim.terrain.segment_count(),
        sim.terrain.width()
    );
    commands.insert_resource(sim);
}

#[allow(clippy::too_many_arguments)]
fn restart_run_on_request(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<ColorMaterial>>,
    mut restart_requests: MessageReader<RunRestartRequested>,
    mut config_reloads: MessageReader<ConfigReloadedEvent>,
    config: Res<GameConfig>,
    mut sim: ResMut<VehicleSim>,
    mut telemetry: ResMut<VehicleTelemetry>,
    mut zoom: ResMut<CameraZoomState>,
    scene_query: Query<Entity, With<RunSceneEntity>>,
) {
    let restarts = restart_requests.read().count();
    let reloads = config_reloads.read().count();
    if restarts == 0 && reloads == 0 {
        return;
    }

    let rebuilt = match VehicleSim::from_config(&config) {
        Ok(rebuilt) => rebuilt,
        Err(error) => {
            error!("Could not restart run; keeping the current one: {error}");
            return;
        }
    };

    despawn_run_scene(&mut commands, &scene_query);
    spawn_run_scene(&mut commands, &mut meshes, &mut materials, &rebuilt);
    *telemetry = VehicleTelemetry::starting_at(rebuilt.car.body.position.x);
    zoom.zoom = config.game.camera.max_zoom;
    *sim = rebuilt;

    if reloads > 0 {
        info!("Run rebuilt from reloaded config.");
    } else {
        info!("Run restarted.");
    }
}

/// Pushes live stiffness/damping edits into the running wheels.
fn sync_live_suspension_tuning(config: Res<GameConfig>, mut sim: ResMut<VehicleSim>) {
    if !config.is_changed() {
        return;
    }
    let Some(vehicle) = config.vehicles_by_id.get(&sim.vehicle_id) else {
        return;
    };

    let car = &mut sim.car;
    for wheel in [&mut car.back, &mut car.front] {
        wheel.stiffness = vehicle.suspension_stiffness;
        wheel.damping = vehicle.suspension_damping;
    }
}

fn read_vehicle_input(
    keyboard: Res<ButtonInput<KeyCode>>,
    bindings: Res<VehicleInputBindings>,
    mut input_state: ResMut<VehicleInputState>,
) {
    input_state.steer = SteerInput {
        left: bindings.steer_left.iter().any(|key| keyboard.pressed(*key)),
        right: bindings.steer_right.iter().any(|key| keyboard.pressed(*key)),
    };
}

fn step_vehicle_simulation(
    time: Res<Time>,
    config: Res<GameConfig>,
    input_state: Res<VehicleInputState>,
    mut sim: ResMut<VehicleSim>,
) {
    let physics = config.physics.physics;
    let dt = time.delta_secs().min(physics.max_step_seconds);
    if dt <= 0.0 {
        return;
    }

    let VehicleSim {
        car,
        terrain,
        last_report,
        ..
    } = &mut *sim;
    *last_report = Some(car.step(terrain, input_state.steer, &physics, dt));
}

fn update_vehicle_telemetry(
    time: Res<Time>,
    config: Res<GameConfig>,
    sim: Res<VehicleSim>,
    mut telemetry: ResMut<VehicleTelemetry>,
) {
    let Some(report) = sim.last_report.as_ref() else {
        return;
    };
    let dt = time
        .delta_secs()
        .min(config.physics.physics.max_step_seconds);

    if let Some(landing) = telemetry.record_step(&sim.car, report, dt) {
        info!(
            "Landed after {:.2}s airborne at {:.0}px/s.",
            landing.airtime_s, landing.impact_speed_px_s
        );
    }
}

fn camera_follow_vehicle(
    time: Res<Time>,
    config: Res<GameConfig>,
    sim: Res<VehicleSim>,
    mut zoom: ResMut<CameraZoomState>,
    mut camera_query: Query<(&mut Transform, &mut Projection), With<Camera2d>>,
) {
    let Ok((mut camera_transform, mut projection)) = camera_query.single_mut() else {
        return;
    };
    let camera = &config.game.camera;

    let target = target_zoom(sim.car.body.velocity.x, camera);
    zoom.zoom = ease_zoom(zoom.zoom, target, camera.zoom_easing, time.delta_secs());
    if let Projection::Orthographic(ortho) = &mut *projection {
        ortho.scale = 1.0 / zoom.zoom.max(f32::EPSILON);
    }

    let focus = screen_to_world(sim.car.body.position + Vec2::new(0.0, camera.look_offset_y));
    camera_transform.translation = focus.extend(CAMERA_Z);
}
