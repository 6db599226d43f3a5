use bevy::prelude::*;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_DIR: &str = "config";

pub struct ConfigPlugin;

impl Plugin for ConfigPlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<ConfigReloadedEvent>()
            .add_systems(Startup, load_game_config)
            .add_systems(Update, reload_game_config_hotkey);
    }
}

/// Written whenever the whole config is replaced from disk, so the run can
/// rebuild terrain and respawn the car. Live edits from the tuning panel do not
/// emit it.
#[derive(Message, Debug, Clone, Copy)]
pub struct ConfigReloadedEvent;

fn load_game_config(mut commands: Commands) {
    let config = GameConfig::load_from_dir(Path::new(CONFIG_DIR)).unwrap_or_else(|error| {
        panic!("failed to load configuration from `{CONFIG_DIR}`: {error}");
    });

    log_config_summary("Loaded", &config);
    info!("Press F5 to hot-reload config files from `{CONFIG_DIR}`.");

    commands.insert_resource(config);
}

fn reload_game_config_hotkey(
    keyboard: Res<ButtonInput<KeyCode>>,
    game_config: Option<ResMut<GameConfig>>,
    mut reloaded: MessageWriter<ConfigReloadedEvent>,
) {
    if !keyboard.just_pressed(KeyCode::F5) {
        return;
    }

    let Some(mut current_config) = game_config else {
        warn!("Config hot-reload requested, but `GameConfig` resource is not initialized yet.");
        return;
    };

    match GameConfig::load_from_dir(Path::new(CONFIG_DIR)) {
        Ok(new_config) => {
            *current_config = new_config;
            log_config_summary("Hot-reloaded", &current_config);
            reloaded.write(ConfigReloadedEvent);
        }
        Err(error) => {
            error!("Config hot-reload failed; keeping previous config: {error}");
        }
    }
}

fn log_config_summary(prefix: &str, config: &GameConfig) {
    info!(
        "{prefix} config: {} vehicles (active `{}`), {} terrain points every {:.1}px, gravity {:.1}.",
        config.vehicles_by_id.len(),
        config.game.app.default_vehicle,
        config.terrain.terrain.point_count,
        config.terrain.terrain.spacing,
        config.physics.physics.gravity
    );
}

#[derive(Resource, Debug, Clone)]
pub struct GameConfig {
    pub game: GameFile,
    pub physics: PhysicsFile,
    pub terrain: TerrainFile,
    pub vehicles: VehiclesFile,
    pub vehicles_by_id: HashMap<String, VehicleConfig>,
}

impl GameConfig {
    pub fn load_from_dir(config_dir: &Path) -> Result<Self, ConfigError> {
        let game: GameFile = read_toml(&config_dir.join("game.toml"))?;
        let physics: PhysicsFile = read_toml(&config_dir.join("physics.toml"))?;
        let terrain: TerrainFile = read_toml(&config_dir.join("terrain.toml"))?;
        let vehicles: VehiclesFile = read_toml(&config_dir.join("vehicles.toml"))?;

        Self::from_files(game, physics, terrain, vehicles)
    }

    pub fn from_files(
        game: GameFile,
        physics: PhysicsFile,
        terrain: TerrainFile,
        vehicles: VehiclesFile,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            vehicles_by_id: to_index("vehicles.toml::vehicles", &vehicles.vehicles)?,
            game,
            physics,
            terrain,
            vehicles,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn active_vehicle(&self) -> Option<&VehicleConfig> {
        self.vehicles_by_id.get(&self.game.app.default_vehicle)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self
            .vehicles_by_id
            .contains_key(&self.game.app.default_vehicle)
        {
            return Err(ConfigError::Validation(format!(
                "game.toml::app.default_vehicle references unknown vehicle id `{}`",
                self.game.app.default_vehicle
            )));
        }

        let camera = &self.game.camera;
        if camera.min_zoom <= 0.0 || camera.max_zoom < camera.min_zoom {
            return Err(ConfigError::Validation(format!(
                "game.toml::camera zoom range [{}, {}] must be positive and ordered",
                camera.min_zoom, camera.max_zoom
            )));
        }
        if camera.zoom_speed_factor < 0.0 || camera.zoom_easing < 0.0 {
            return Err(ConfigError::Validation(
                "game.toml::camera.zoom_speed_factor and zoom_easing must be >= 0".to_string(),
            ));
        }

        self.physics.physics.validate()?;
        self.terrain.terrain.validate()?;

        for (index, vehicle) in self.vehicles.vehicles.iter().enumerate() {
            vehicle.validate(index)?;
        }

        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: Box<toml::de::Error>,
    },
    Validation(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse `{}`: {source}", path.display())
            }
            Self::Validation(message) => write!(f, "{message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source: Box::new(source),
    })
}

fn to_index<T>(label: &str, rows: &[T]) -> Result<HashMap<String, T>, ConfigError>
where
    T: HasId + Clone,
{
    let mut map = HashMap::new();

    for row in rows {
        let id = row.id();
        if id.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{label} contains an empty id"
            )));
        }

        if map.insert(id.to_string(), row.clone()).is_some() {
            return Err(ConfigError::Validation(format!(
                "{label} contains duplicate id `{id}`"
            )));
        }
    }

    Ok(map)
}

trait HasId {
    fn id(&self) -> &str;
}

fn require_positive(label: &str, value: f32) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "{label} must be a finite number > 0 (got {value})"
        )))
    }
}

fn require_non_negative(label: &str, value: f32) -> Result<(), ConfigError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "{label} must be a finite number >= 0 (got {value})"
        )))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameFile {
    pub app: AppConfig,
    pub camera: CameraConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub default_vehicle: String,
    pub debug_overlay: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    pub min_zoom: f32,
    pub max_zoom: f32,
    /// Zoom lost per pixel/second of horizontal speed.
    pub zoom_speed_factor: f32,
    pub zoom_easing: f32,
    pub look_offset_y: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhysicsFile {
    pub physics: PhysicsConfig,
}

/// Tuning constants for one simulation step. Lengths are pixels, velocities
/// are pixels per second, angles are degrees unless noted.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PhysicsConfig {
    pub gravity: f32,
    /// Horizontal acceleration per radian of slope under a grounded wheel.
    pub hill_speed: f32,
    pub friction: f32,
    pub drive_acceleration: f32,
    pub air_rotate_speed: f32,
    pub rotate_back_speed: f32,
    #[serde(default = "default_wheel_reaction_ratio")]
    pub wheel_reaction_ratio: f32,
    #[serde(default = "default_contact_overlap")]
    pub contact_overlap: f32,
    pub floor_y: f32,
    #[serde(default = "default_max_step_seconds")]
    pub max_step_seconds: f32,
}

fn default_wheel_reaction_ratio() -> f32 {
    0.7
}

fn default_contact_overlap() -> f32 {
    1.0
}

fn default_max_step_seconds() -> f32 {
    1.0 / 30.0
}

impl PhysicsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require_non_negative("physics.toml::physics.gravity", self.gravity)?;
        require_non_negative("physics.toml::physics.friction", self.friction)?;
        require_non_negative(
            "physics.toml::physics.drive_acceleration",
            self.drive_acceleration,
        )?;
        require_non_negative(
            "physics.toml::physics.rotate_back_speed",
            self.rotate_back_speed,
        )?;
        require_non_negative(
            "physics.toml::physics.contact_overlap",
            self.contact_overlap,
        )?;
        require_positive(
            "physics.toml::physics.max_step_seconds",
            self.max_step_seconds,
        )?;
        if !(0.0..=1.0).contains(&self.wheel_reaction_ratio) {
            return Err(ConfigError::Validation(format!(
                "physics.toml::physics.wheel_reaction_ratio must be within [0, 1] (got {})",
                self.wheel_reaction_ratio
            )));
        }
        if !self.hill_speed.is_finite() || !self.air_rotate_speed.is_finite() {
            return Err(ConfigError::Validation(
                "physics.toml::physics.hill_speed and air_rotate_speed must be finite".to_string(),
            ));
        }
        if !self.floor_y.is_finite() {
            return Err(ConfigError::Validation(
                "physics.toml::physics.floor_y must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TerrainFile {
    pub terrain: TerrainConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TerrainConfig {
    pub seed: u64,
    pub point_count: usize,
    pub spacing: f32,
    pub start_y: f32,
    pub max_step: f32,
    pub min_y: f32,
    pub max_y: f32,
    #[serde(default)]
    pub flat_lead_in: usize,
}

impl TerrainConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.point_count < 2 {
            return Err(ConfigError::Validation(format!(
                "terrain.toml::terrain.point_count must be >= 2 (got {})",
                self.point_count
            )));
        }
        require_positive("terrain.toml::terrain.spacing", self.spacing)?;
        require_non_negative("terrain.toml::terrain.max_step", self.max_step)?;
        if self.min_y > self.max_y {
            return Err(ConfigError::Validation(format!(
                "terrain.toml::terrain min_y ({}) must not exceed max_y ({})",
                self.min_y, self.max_y
            )));
        }
        if !(self.min_y..=self.max_y).contains(&self.start_y) {
            return Err(ConfigError::Validation(format!(
                "terrain.toml::terrain.start_y ({}) must lie within [{}, {}]",
                self.start_y, self.min_y, self.max_y
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VehiclesFile {
    pub vehicles: Vec<VehicleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VehicleConfig {
    pub id: String,
    pub body_width: f32,
    pub body_height: f32,
    pub wheel_radius: f32,
    pub wheel_padding: f32,
    pub suspension_stiffness: f32,
    pub suspension_damping: f32,
    pub spawn_x: f32,
    /// Height above the terrain surface (at `spawn_x`) the car is dropped from.
    #[serde(default)]
    pub spawn_drop_height: f32,
}

impl VehicleConfig {
    fn validate(&self, index: usize) -> Result<(), ConfigError> {
        let label = |field: &str| format!("vehicles.toml::vehicles[{index}].{field}");
        require_positive(&label("body_width"), self.body_width)?;
        require_positive(&label("body_height"), self.body_height)?;
        require_positive(&label("wheel_radius"), self.wheel_radius)?;
        require_non_negative(&label("wheel_padding"), self.wheel_padding)?;
        require_non_negative(&label("suspension_stiffness"), self.suspension_stiffness)?;
        require_non_negative(&label("suspension_damping"), self.suspension_damping)?;
        require_non_negative(&label("spawn_drop_height"), self.spawn_drop_height)?;

        if self.body_width < 2.0 * (self.wheel_padding + self.wheel_radius) {
            return Err(ConfigError::Validation(format!(
                "{} is too narrow for two wheels of radius {} with padding {}",
                label("body_width"),
                self.wheel_radius,
                self.wheel_padding
            )));
        }
        Ok(())
    }
}

impl HasId for VehicleConfig {
    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
pub(crate) fn test_physics() -> PhysicsConfig {
    PhysicsConfig {
        gravity: 1200.0,
        hill_speed: 400.0,
        friction: 1.2,
        drive_acceleration: 500.0,
        air_rotate_speed: 150.0,
        rotate_back_speed: 4.0,
        wheel_reaction_ratio: 0.7,
        contact_overlap: 1.0,
        floor_y: 800.0,
        max_step_seconds: 1.0 / 30.0,
    }
}

#[cfg(test)]
pub(crate) fn test_vehicle() -> VehicleConfig {
    VehicleConfig {
        id: "test_car".to_string(),
        body_width: 250.0,
        body_height: 100.0,
        wheel_radius: 30.0,
        wheel_padding: 10.0,
        suspension_stiffness: 100.0,
        suspension_damping: 8.0,
        spawn_x: 300.0,
        spawn_drop_height: 50.0,
    }
}

#[cfg(test)]
pub(crate) fn test_game_config() -> GameConfig {
    GameConfig::from_files(
        GameFile {
            app: AppConfig {
                default_vehicle: "test_car".to_string(),
                debug_overlay: true,
            },
            camera: CameraConfig {
                min_zoom: 1.0,
                max_zoom: 1.3,
                zoom_speed_factor: 0.0008,
                zoom_easing: 3.0,
                look_offset_y: -80.0,
            },
        },
        PhysicsFile {
            physics: test_physics(),
        },
        TerrainFile {
            terrain: TerrainConfig {
                seed: 7,
                point_count: 64,
                spacing: 40.0,
                start_y: 600.0,
                max_step: 25.0,
                min_y: 350.0,
                max_y: 720.0,
                flat_lead_in: 12,
            },
        },
        VehiclesFile {
            vehicles: vec![test_vehicle()],
        },
    )
    .expect("test config should validate")
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAME_TOML: &str = r#"
[app]
default_vehicle = "buggy"
debug_overlay = true

[camera]
min_zoom = 1.0
max_zoom = 1.3
zoom_speed_factor = 0.0008
zoom_easing = 3.0
look_offset_y = -80.0
"#;

    const PHYSICS_TOML: &str = r#"
[physics]
gravity = 1200.0
hill_speed = 400.0
friction = 1.2
drive_acceleration = 500.0
air_rotate_speed = 150.0
rotate_back_speed = 4.0
floor_y = 800.0
"#;

    const TERRAIN_TOML: &str = r#"
[terrain]
seed = 7
point_count = 64
spacing = 40.0
start_y = 600.0
max_step = 25.0
min_y = 350.0
max_y = 720.0
flat_lead_in = 8
"#;

    const VEHICLES_TOML: &str = r#"
[[vehicles]]
id = "buggy"
body_width = 250.0
body_height = 100.0
wheel_radius = 30.0
wheel_padding = 10.0
suspension_stiffness = 100.0
suspension_damping = 8.0
spawn_x = 300.0
spawn_drop_height = 120.0
"#;

    fn parse_files() -> (GameFile, PhysicsFile, TerrainFile, VehiclesFile) {
        (
            toml::from_str(GAME_TOML).expect("game.toml should parse"),
            toml::from_str(PHYSICS_TOML).expect("physics.toml should parse"),
            toml::from_str(TERRAIN_TOML).expect("terrain.toml should parse"),
            toml::from_str(VEHICLES_TOML).expect("vehicles.toml should parse"),
        )
    }

    #[test]
    fn parses_and_applies_physics_defaults() {
        let (game, physics, terrain, vehicles) = parse_files();
        let config = GameConfig::from_files(game, physics, terrain, vehicles)
            .expect("config should validate");

        assert_eq!(config.physics.physics.wheel_reaction_ratio, 0.7);
        assert_eq!(config.physics.physics.contact_overlap, 1.0);
        assert!((config.physics.physics.max_step_seconds - 1.0 / 30.0).abs() < 1e-6);
        assert_eq!(
            config.active_vehicle().map(|vehicle| vehicle.id.as_str()),
            Some("buggy")
        );
    }

    #[test]
    fn validation_fails_for_missing_vehicle_reference() {
        let (mut game, physics, terrain, vehicles) = parse_files();
        game.app.default_vehicle = "missing_car".to_string();

        let error = GameConfig::from_files(game, physics, terrain, vehicles)
            .expect_err("validation should fail");
        let message = error.to_string();

        assert!(message.contains("default_vehicle"));
        assert!(message.contains("missing_car"));
    }

    #[test]
    fn validation_rejects_duplicate_vehicle_ids() {
        let (game, physics, terrain, mut vehicles) = parse_files();
        vehicles.vehicles.push(vehicles.vehicles[0].clone());

        let error = GameConfig::from_files(game, physics, terrain, vehicles)
            .expect_err("duplicate ids should fail");

        assert!(error.to_string().contains("duplicate id `buggy`"));
    }

    #[test]
    fn validation_rejects_degenerate_terrain() {
        let (game, physics, mut terrain, vehicles) = parse_files();
        terrain.terrain.point_count = 1;

        let error = GameConfig::from_files(game, physics, terrain, vehicles)
            .expect_err("single point terrain should fail");

        assert!(error.to_string().contains("point_count"));
    }

    #[test]
    fn validation_rejects_out_of_range_reaction_ratio() {
        let (game, mut physics, terrain, vehicles) = parse_files();
        physics.physics.wheel_reaction_ratio = 1.5;

        let error = GameConfig::from_files(game, physics, terrain, vehicles)
            .expect_err("reaction ratio above 1 should fail");

        assert!(error.to_string().contains("wheel_reaction_ratio"));
    }

    #[test]
    fn validation_rejects_body_narrower_than_wheelbase() {
        let (game, physics, terrain, mut vehicles) = parse_files();
        vehicles.vehicles[0].body_width = 60.0;

        let error = GameConfig::from_files(game, physics, terrain, vehicles)
            .expect_err("narrow body should fail");

        assert!(error.to_string().contains("too narrow"));
    }

    #[test]
    fn parse_errors_carry_the_file_path() {
        let dir = std::env::temp_dir().join("uphill_car_config_parse_test");
        fs::create_dir_all(&dir).expect("temp dir should be writable");
        let path = dir.join("broken.toml");
        fs::write(&path, "[physics\ngravity = ").expect("temp file should be writable");

        let error = read_toml::<PhysicsFile>(&path).expect_err("broken toml should fail");

        assert!(matches!(error, ConfigError::Parse { .. }));
        assert!(error.to_string().contains("broken.toml"));
        let _ = fs::remove_file(&path);
    }
}
