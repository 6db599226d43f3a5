use crate::config::{GameConfig, PhysicsConfig, VehicleConfig, CONFIG_DIR};
use crate::gameplay::vehicle::{
    screen_to_world, VehicleInputState, VehicleSim, VehicleSnapshot, VehicleTelemetry,
    WheelStepReport,
};
use crate::states::GameState;
use bevy::diagnostic::{DiagnosticsStore, FrameTimeDiagnosticsPlugin};
use bevy::math::Isometry2d;
use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPrimaryContextPass};
use std::fs;
use std::path::Path;

const SUSPENSION_RAY_COLOR: Color = Color::srgb(0.95, 0.55, 0.15);
const ATTACHMENT_COLOR: Color = Color::srgb(0.20, 0.65, 0.95);
const CONTACT_COLOR: Color = Color::srgb(0.95, 0.20, 0.25);
const BODY_OUTLINE_COLOR: Color = Color::srgb(0.98, 0.92, 0.30);
const FORCE_GIZMO_SCALE: f32 = 4.0;

pub struct DebugOverlayPlugin;

impl Plugin for DebugOverlayPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<KeybindOverlayState>()
            .init_resource::<DebugGizmoState>()
            .init_resource::<PhysicsTuningPanelState>()
            .add_systems(Update, spawn_debug_overlay)
            .add_systems(Update, toggle_keybind_overlay)
            .add_systems(Update, toggle_debug_gizmos)
            .add_systems(Update, toggle_physics_tuning_panel)
            .add_systems(Update, sync_keybind_overlay_visibility)
            .add_systems(
                Update,
                (update_debug_overlay_text, draw_vehicle_gizmos, log_vehicle_snapshot)
                    .run_if(in_state(GameState::InRun))
                    .run_if(resource_exists::<GameConfig>)
                    .run_if(resource_exists::<VehicleSim>),
            )
            .add_systems(
                EguiPrimaryContextPass,
                physics_tuning_panel_ui
                    .run_if(in_state(GameState::InRun))
                    .run_if(resource_exists::<GameConfig>),
            );
    }
}

#[derive(Component)]
struct DebugOverlayText;

#[derive(Component)]
struct KeybindOverlayText;

#[derive(Resource, Debug, Clone, Default)]
struct KeybindOverlayState {
    visible: bool,
}

#[derive(Resource, Debug, Clone, Default)]
struct DebugGizmoState {
    visible: bool,
}

/// Editable copy of every live-tunable value. Physics constants are global;
/// the suspension pair belongs to the active vehicle.
#[derive(Debug, Clone, PartialEq)]
struct PhysicsTuningParams {
    gravity: f32,
    hill_speed: f32,
    friction: f32,
    drive_acceleration: f32,
    air_rotate_speed: f32,
    rotate_back_speed: f32,
    wheel_reaction_ratio: f32,
    contact_overlap: f32,
    suspension_stiffness: f32,
    suspension_damping: f32,
}

impl PhysicsTuningParams {
    fn from_config(physics: &PhysicsConfig, vehicle: &VehicleConfig) -> Self {
        Self {
            gravity: physics.gravity,
            hill_speed: physics.hill_speed,
            friction: physics.friction,
            drive_acceleration: physics.drive_acceleration,
            air_rotate_speed: physics.air_rotate_speed,
            rotate_back_speed: physics.rotate_back_speed,
            wheel_reaction_ratio: physics.wheel_reaction_ratio,
            contact_overlap: physics.contact_overlap,
            suspension_stiffness: vehicle.suspension_stiffness,
            suspension_damping: vehicle.suspension_damping,
        }
    }

    fn apply_to_physics(&self, physics: &mut PhysicsConfig) {
        physics.gravity = self.gravity;
        physics.hill_speed = self.hill_speed;
        physics.friction = self.friction;
        physics.drive_acceleration = self.drive_acceleration;
        physics.air_rotate_speed = self.air_rotate_speed;
        physics.rotate_back_speed = self.rotate_back_speed;
        physics.wheel_reaction_ratio = self.wheel_reaction_ratio;
        physics.contact_overlap = self.contact_overlap;
    }

    fn apply_to_vehicle(&self, vehicle: &mut VehicleConfig) {
        vehicle.suspension_stiffness = self.suspension_stiffness;
        vehicle.suspension_damping = self.suspension_damping;
    }
}

#[derive(Resource, Debug, Default)]
struct PhysicsTuningPanelState {
    visible: bool,
    source_vehicle_id: String,
    params: Option<PhysicsTuningParams>,
    status: String,
}

fn spawn_debug_overlay(
    mut commands: Commands,
    keybind_overlay: Res<KeybindOverlayState>,
    config: Option<Res<GameConfig>>,
    existing_overlay: Query<Entity, With<DebugOverlayText>>,
) {
    if !existing_overlay.is_empty() {
        return;
    }

    let Some(config) = config else {
        return;
    };

    if !config.game.app.debug_overlay {
        return;
    }

    commands.spawn((
        DebugOverlayText,
        Text::new("debug overlay initializing..."),
        TextFont {
            font_size: 16.0,
            ..default()
        },
        TextColor(Color::srgb(0.08, 0.10, 0.12)),
        Node {
            position_type: PositionType::Absolute,
            left: Val::Px(12.0),
            top: Val::Px(12.0),
            ..default()
        },
        ZIndex(100),
    ));

    commands.spawn((
        KeybindOverlayText,
        Text::new(keybind_overlay_text()),
        TextFont {
            font_size: 15.0,
            ..default()
        },
        TextColor(Color::srgb(0.90, 0.94, 0.97)),
        BackgroundColor(Color::srgba(0.06, 0.08, 0.10, 0.82)),
        BorderColor::all(Color::srgba(0.60, 0.68, 0.74, 0.9)),
        Node {
            position_type: PositionType::Absolute,
            left: Val::Px(12.0),
            top: Val::Px(190.0),
            padding: UiRect::axes(Val::Px(10.0), Val::Px(8.0)),
            border: UiRect::all(Val::Px(1.0)),
            ..default()
        },
        if keybind_overlay.visible {
            Visibility::Inherited
        } else {
            Visibility::Hidden
        },
        ZIndex(100),
    ));
}

fn update_debug_overlay_text(
    diagnostics: Res<DiagnosticsStore>,
    telemetry: Res<VehicleTelemetry>,
    input_state: Res<VehicleInputState>,
    sim: Res<VehicleSim>,
    mut overlay_query: Query<&mut Text, With<DebugOverlayText>>,
) {
    let Ok(mut text) = overlay_query.single_mut() else {
        return;
    };

    let fps = diagnostics
        .get(&FrameTimeDiagnosticsPlugin::FPS)
        .and_then(|value| value.smoothed())
        .unwrap_or(0.0);
    let yes_no = |flag: bool| if flag { "yes" } else { "no" };

    *text = Text::new(format!(
        "FPS: {fps:>5.1}\nDistance: {distance:>7.1}px | X: {x:>7.1}px\nSpeed: {speed:>6.1} px/s (max {max_speed:>6.1})\nAngle: {angle:>6.1} deg (wheels {wheel_angle:>6.1})\nInput: left={left} right={right}\nGrounded: back={back} front={front}\nStretch: back={back_stretch:>5.1} front={front_stretch:>5.1}\nAirtime: {air_cur:>4.2}s (best {air_best:>4.2}) | Landings: {landings} (last {impact:>5.0} px/s)\nHotkeys: H help | G gizmos | V tuning | F5 reload | F9 snapshot",
        distance = telemetry.distance_px,
        x = sim.car.body.position.x,
        speed = telemetry.speed_px_s,
        max_speed = telemetry.max_speed_px_s,
        angle = telemetry.body_angle_deg,
        wheel_angle = sim.car.wheel_line_angle(),
        left = yes_no(input_state.steer.left),
        right = yes_no(input_state.steer.right),
        back = yes_no(telemetry.back_grounded),
        front = yes_no(telemetry.front_grounded),
        back_stretch = telemetry.back_stretch_px,
        front_stretch = telemetry.front_stretch_px,
        air_cur = telemetry.airtime_current_s,
        air_best = telemetry.airtime_best_s,
        landings = telemetry.landing_count,
        impact = telemetry.last_landing_speed_px_s,
    ));
}

fn toggle_keybind_overlay(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut state: ResMut<KeybindOverlayState>,
    config: Option<Res<GameConfig>>,
) {
    let Some(config) = config else {
        return;
    };

    if !config.game.app.debug_overlay {
        return;
    }

    if keyboard.just_pressed(KeyCode::KeyH) {
        state.visible = !state.visible;
        info!(
            "Debug keybind panel {}.",
            if state.visible { "shown" } else { "hidden" }
        );
    }
}

fn sync_keybind_overlay_visibility(
    state: Res<KeybindOverlayState>,
    mut query: Query<&mut Visibility, With<KeybindOverlayText>>,
) {
    if !state.is_changed() {
        return;
    }

    let next_visibility = if state.visible {
        Visibility::Inherited
    } else {
        Visibility::Hidden
    };

    for mut visibility in &mut query {
        *visibility = next_visibility;
    }
}

fn toggle_debug_gizmos(keyboard: Res<ButtonInput<KeyCode>>, mut state: ResMut<DebugGizmoState>) {
    if keyboard.just_pressed(KeyCode::KeyG) {
        state.visible = !state.visible;
        info!(
            "Suspension gizmos {}.",
            if state.visible { "shown" } else { "hidden" }
        );
    }
}

fn draw_vehicle_gizmos(state: Res<DebugGizmoState>, sim: Res<VehicleSim>, mut gizmos: Gizmos) {
    if !state.visible {
        return;
    }

    let body = &sim.car.body;
    let rotation = body.rotation();
    let half = body.half_extents();
    let corners = [
        Vec2::new(-half.x, -half.y),
        Vec2::new(half.x, -half.y),
        Vec2::new(half.x, half.y),
        Vec2::new(-half.x, half.y),
        Vec2::new(-half.x, -half.y),
    ]
    .map(|corner| screen_to_world(body.position + rotation * corner));
    gizmos.linestrip_2d(corners, BODY_OUTLINE_COLOR);

    let Some(report) = sim.last_report.as_ref() else {
        return;
    };
    for (wheel, wheel_report) in [(&sim.car.back, &report.back), (&sim.car.front, &report.front)] {
        draw_wheel_gizmos(&mut gizmos, wheel.position, wheel.radius, wheel_report);
    }
}

fn draw_wheel_gizmos(
    gizmos: &mut Gizmos,
    wheel_position: Vec2,
    wheel_radius: f32,
    report: &WheelStepReport,
) {
    let attachment = screen_to_world(report.suspension.attachment);
    let wheel = screen_to_world(wheel_position);

    gizmos.line_2d(attachment, wheel, SUSPENSION_RAY_COLOR);
    gizmos.circle_2d(Isometry2d::from_translation(attachment), 4.0, ATTACHMENT_COLOR);
    gizmos.circle_2d(Isometry2d::from_translation(wheel), wheel_radius, SUSPENSION_RAY_COLOR);
    gizmos.line_2d(
        attachment,
        attachment + screen_to_world(report.suspension.force) * FORCE_GIZMO_SCALE,
        ATTACHMENT_COLOR,
    );

    if let Some(contact) = report.contact {
        gizmos.circle_2d(
            Isometry2d::from_translation(screen_to_world(contact)),
            3.0,
            CONTACT_COLOR,
        );
    }
}

fn log_vehicle_snapshot(
    keyboard: Res<ButtonInput<KeyCode>>,
    sim: Res<VehicleSim>,
    telemetry: Res<VehicleTelemetry>,
) {
    if !keyboard.just_pressed(KeyCode::F9) {
        return;
    }

    let snapshot = VehicleSnapshot::capture(&sim, &telemetry);
    match serde_json::to_string_pretty(&snapshot) {
        Ok(json) => info!("Vehicle snapshot:\n{json}"),
        Err(error) => error!("Failed to serialize vehicle snapshot: {error}"),
    }
}

fn toggle_physics_tuning_panel(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut panel_state: ResMut<PhysicsTuningPanelState>,
    config: Option<Res<GameConfig>>,
) {
    if !keyboard.just_pressed(KeyCode::KeyV) {
        return;
    }

    panel_state.visible = !panel_state.visible;
    if panel_state.visible {
        if let Some(config) = config {
            if let Err(error) = sync_panel_state_from_config(&mut panel_state, &config) {
                panel_state.status = error;
            }
        }
        info!("Physics tuning panel shown.");
    } else {
        info!("Physics tuning panel hidden.");
    }
}

fn physics_tuning_panel_ui(
    mut egui_contexts: EguiContexts,
    mut panel_state: ResMut<PhysicsTuningPanelState>,
    mut config: ResMut<GameConfig>,
) {
    if !panel_state.visible {
        return;
    }

    if panel_state.params.is_none()
        || panel_state.source_vehicle_id != config.game.app.default_vehicle
    {
        if let Err(error) = sync_panel_state_from_config(&mut panel_state, &config) {
            panel_state.status = error;
            return;
        }
    }

    let Some(mut params) = panel_state.params.clone() else {
        return;
    };

    let mut window_open = panel_state.visible;
    let mut params_changed = false;
    let mut reload_clicked = false;
    let mut apply_clicked = false;
    let status = panel_state.status.clone();
    let vehicle_id = panel_state.source_vehicle_id.clone();

    let Ok(ctx) = egui_contexts.ctx_mut() else {
        return;
    };
    egui::Window::new("Physics Tuning")
        .open(&mut window_open)
        .resizable(true)
        .default_width(520.0)
        .show(ctx, |ui| {
            ui.label(format!("Active vehicle: {vehicle_id}"));
            ui.label("Each row has a slider plus a free-form float value.");
            ui.separator();

            ui.collapsing("Body", |ui| {
                params_changed |=
                    tuning_slider_row(ui, "gravity", &mut params.gravity, 0.0..=4000.0, 5.0);
                params_changed |= tuning_slider_row(
                    ui,
                    "hill_speed",
                    &mut params.hill_speed,
                    0.0..=2000.0,
                    5.0,
                );
                params_changed |=
                    tuning_slider_row(ui, "friction", &mut params.friction, 0.0..=10.0, 0.05);
                params_changed |= tuning_slider_row(
                    ui,
                    "drive_acceleration",
                    &mut params.drive_acceleration,
                    0.0..=3000.0,
                    5.0,
                );
            });

            ui.collapsing("Orientation", |ui| {
                params_changed |= tuning_slider_row(
                    ui,
                    "air_rotate_speed",
                    &mut params.air_rotate_speed,
                    0.0..=720.0,
                    1.0,
                );
                params_changed |= tuning_slider_row(
                    ui,
                    "rotate_back_speed",
                    &mut params.rotate_back_speed,
                    0.0..=30.0,
                    0.1,
                );
            });

            ui.collapsing("Suspension", |ui| {
                params_changed |= tuning_slider_row(
                    ui,
                    "suspension_stiffness",
                    &mut params.suspension_stiffness,
                    0.0..=600.0,
                    1.0,
                );
                params_changed |= tuning_slider_row(
                    ui,
                    "suspension_damping",
                    &mut params.suspension_damping,
                    0.0..=40.0,
                    0.1,
                );
                params_changed |= tuning_slider_row(
                    ui,
                    "wheel_reaction_ratio",
                    &mut params.wheel_reaction_ratio,
                    0.0..=1.0,
                    0.01,
                );
                params_changed |= tuning_slider_row(
                    ui,
                    "contact_overlap",
                    &mut params.contact_overlap,
                    0.0..=5.0,
                    0.05,
                );
            });

            ui.separator();
            ui.horizontal(|ui| {
                if ui.button("Reload From Config").clicked() {
                    reload_clicked = true;
                }
                if ui.button("Apply To physics.toml").clicked() {
                    apply_clicked = true;
                }
            });

            if !status.is_empty() {
                ui.separator();
                ui.label(status);
            }
        });

    panel_state.visible = window_open;

    if reload_clicked {
        match sync_panel_state_from_config(&mut panel_state, &config) {
            Ok(()) => panel_state.status = "Reloaded values from current config.".to_string(),
            Err(error) => panel_state.status = error,
        }
        return;
    }

    // Validation rejects reaction ratios outside [0, 1].
    params.wheel_reaction_ratio = params.wheel_reaction_ratio.clamp(0.0, 1.0);
    panel_state.params = Some(params.clone());

    if params_changed {
        if let Err(error) =
            apply_tuning_to_runtime_config(&mut config, &panel_state.source_vehicle_id, &params)
        {
            panel_state.status = error;
        } else {
            panel_state.status = "Live-tuning active (in-memory config updated).".to_string();
        }
    }

    if apply_clicked {
        match persist_tuning_and_reload(&mut config, &panel_state.source_vehicle_id, &params) {
            Ok(message) => {
                info!("{message}");
                panel_state.status = message;
                if let Err(error) = sync_panel_state_from_config(&mut panel_state, &config) {
                    panel_state.status = error;
                }
            }
            Err(error) => {
                error!("{error}");
                panel_state.status = error;
            }
        }
    }
}

fn tuning_slider_row(
    ui: &mut egui::Ui,
    label: &str,
    value: &mut f32,
    slider_range: std::ops::RangeInclusive<f32>,
    drag_speed: f32,
) -> bool {
    let mut changed = false;
    ui.horizontal(|ui| {
        ui.label(label);
        changed |= ui
            .add(egui::Slider::new(value, slider_range).show_value(false))
            .changed();
        changed |= ui
            .add(egui::DragValue::new(value).speed(drag_speed as f64))
            .changed();
    });
    changed
}

fn sync_panel_state_from_config(
    panel_state: &mut PhysicsTuningPanelState,
    config: &GameConfig,
) -> Result<(), String> {
    let vehicle_id = config.game.app.default_vehicle.clone();
    let Some(vehicle) = config.vehicles_by_id.get(&vehicle_id) else {
        return Err(format!(
            "Physics tuning panel: default vehicle `{vehicle_id}` not found in config."
        ));
    };

    panel_state.params = Some(PhysicsTuningParams::from_config(
        &config.physics.physics,
        vehicle,
    ));
    panel_state.source_vehicle_id = vehicle_id;
    Ok(())
}

fn apply_tuning_to_runtime_config(
    config: &mut GameConfig,
    vehicle_id: &str,
    params: &PhysicsTuningParams,
) -> Result<(), String> {
    params.apply_to_physics(&mut config.physics.physics);

    let Some(vehicle) = config.vehicles_by_id.get_mut(vehicle_id) else {
        return Err(format!(
            "Physics tuning panel: runtime vehicle `{vehicle_id}` not found in vehicles_by_id."
        ));
    };
    params.apply_to_vehicle(vehicle);

    let Some(vehicle) = config
        .vehicles
        .vehicles
        .iter_mut()
        .find(|v| v.id == vehicle_id)
    else {
        return Err(format!(
            "Physics tuning panel: runtime vehicle `{vehicle_id}` not found in vehicles list."
        ));
    };
    params.apply_to_vehicle(vehicle);
    Ok(())
}

/// Writes the panel values into `physics.toml` and `vehicles.toml`, then reloads
/// the whole config. Both files are restored if the result fails validation.
fn persist_tuning_and_reload(
    config: &mut GameConfig,
    vehicle_id: &str,
    params: &PhysicsTuningParams,
) -> Result<String, String> {
    let config_dir = Path::new(CONFIG_DIR);
    let physics_path = config_dir.join("physics.toml");
    let vehicles_path = config_dir.join("vehicles.toml");

    let original_physics = fs::read_to_string(&physics_path)
        .map_err(|error| format!("Failed reading `{}`: {error}", physics_path.display()))?;
    let original_vehicles = fs::read_to_string(&vehicles_path)
        .map_err(|error| format!("Failed reading `{}`: {error}", vehicles_path.display()))?;

    let mut physics_root: toml::Value = toml::from_str(&original_physics)
        .map_err(|error| format!("Failed parsing `{}`: {error}", physics_path.display()))?;
    let mut vehicles_root: toml::Value = toml::from_str(&original_vehicles)
        .map_err(|error| format!("Failed parsing `{}`: {error}", vehicles_path.display()))?;

    write_physics_to_toml_value(&mut physics_root, params)?;
    write_suspension_to_toml_value(&mut vehicles_root, vehicle_id, params)?;

    let updated_physics = toml::to_string_pretty(&physics_root)
        .map_err(|error| format!("Failed serializing physics TOML: {error}"))?;
    let updated_vehicles = toml::to_string_pretty(&vehicles_root)
        .map_err(|error| format!("Failed serializing vehicles TOML: {error}"))?;
    fs::write(&physics_path, updated_physics)
        .map_err(|error| format!("Failed writing `{}`: {error}", physics_path.display()))?;
    fs::write(&vehicles_path, updated_vehicles)
        .map_err(|error| format!("Failed writing `{}`: {error}", vehicles_path.display()))?;

    match GameConfig::load_from_dir(config_dir) {
        Ok(new_config) => {
            *config = new_config;
            Ok(format!(
                "Applied tuning and saved to {} and {}.",
                physics_path.display(),
                vehicles_path.display()
            ))
        }
        Err(error) => {
            let _ = fs::write(&physics_path, original_physics);
            let _ = fs::write(&vehicles_path, original_vehicles);
            if let Ok(restored) = GameConfig::load_from_dir(config_dir) {
                *config = restored;
            }
            Err(format!(
                "Apply failed validation: {error}. Reverted `{}` and `{}`.",
                physics_path.display(),
                vehicles_path.display()
            ))
        }
    }
}

fn write_physics_to_toml_value(
    root: &mut toml::Value,
    params: &PhysicsTuningParams,
) -> Result<(), String> {
    let Some(physics_table) = root.get_mut("physics").and_then(toml::Value::as_table_mut) else {
        return Err("physics.toml: missing or invalid `physics` table".to_string());
    };

    set_toml_float(physics_table, "gravity", params.gravity)?;
    set_toml_float(physics_table, "hill_speed", params.hill_speed)?;
    set_toml_float(physics_table, "friction", params.friction)?;
    set_toml_float(
        physics_table,
        "drive_acceleration",
        params.drive_acceleration,
    )?;
    set_toml_float(physics_table, "air_rotate_speed", params.air_rotate_speed)?;
    set_toml_float(physics_table, "rotate_back_speed", params.rotate_back_speed)?;
    set_toml_float(
        physics_table,
        "wheel_reaction_ratio",
        params.wheel_reaction_ratio,
    )?;
    set_toml_float(physics_table, "contact_overlap", params.contact_overlap)?;

    Ok(())
}

fn write_suspension_to_toml_value(
    root: &mut toml::Value,
    vehicle_id: &str,
    params: &PhysicsTuningParams,
) -> Result<(), String> {
    let Some(vehicles_array) = root.get_mut("vehicles").and_then(toml::Value::as_array_mut) else {
        return Err("vehicles.toml: missing or invalid `vehicles` array".to_string());
    };

    let Some(vehicle_table) = vehicles_array.iter_mut().find_map(|vehicle_value| {
        let table = vehicle_value.as_table_mut()?;
        if table.get("id").and_then(toml::Value::as_str) == Some(vehicle_id) {
            Some(table)
        } else {
            None
        }
    }) else {
        return Err(format!(
            "vehicles.toml: could not find vehicle with id `{vehicle_id}`"
        ));
    };

    set_toml_float(
        vehicle_table,
        "suspension_stiffness",
        params.suspension_stiffness,
    )?;
    set_toml_float(
        vehicle_table,
        "suspension_damping",
        params.suspension_damping,
    )?;

    Ok(())
}

fn set_toml_float(
    table: &mut toml::map::Map<String, toml::Value>,
    key: &str,
    value: f32,
) -> Result<(), String> {
    if !value.is_finite() {
        return Err(format!("`{key}` is not a finite number"));
    }

    table.insert(key.to_string(), toml::Value::Float(value as f64));
    Ok(())
}

fn keybind_overlay_text() -> &'static str {
    "Keybinds\n\
H - Toggle this panel\n\
G - Toggle suspension gizmos\n\
V - Toggle physics tuning panel\n\
F5 - Hot-reload config\n\
F9 - Log vehicle snapshot\n\
D / Right - Drive right / rotate clockwise in air\n\
A / Left - Drive left / rotate counter-clockwise in air\n\
Esc - Pause / resume\n\
R - Restart run\n\
Q - Quit from pause"
}
