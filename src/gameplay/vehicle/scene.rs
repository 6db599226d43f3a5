use super::*;

const TERRAIN_FILL_COLORS: [Color; 2] = [
    Color::srgb(0.33, 0.52, 0.27),
    Color::srgb(0.29, 0.47, 0.24),
];
const TERRAIN_RIDGE_COLOR: Color = Color::srgb(0.20, 0.34, 0.16);
const CAR_BODY_COLOR: Color = Color::srgb(0.12, 0.12, 0.14);
const WHEEL_COLOR: Color = Color::srgb(0.05, 0.05, 0.05);
const WHEEL_SPOKE_COLOR: Color = Color::srgb(0.78, 0.78, 0.80);

/// Tags every entity that belongs to the current run, so a restart can clear
/// the scene in one pass.
#[derive(Component)]
pub(super) struct RunSceneEntity;

#[derive(Component)]
pub(super) struct CarBodyVisual;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum WheelAxle {
    Back,
    Front,
}

#[derive(Component, Debug, Clone, Copy)]
pub(super) struct WheelVisual {
    axle: WheelAxle,
}

pub(super) fn spawn_run_scene(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<ColorMaterial>,
    sim: &VehicleSim,
) {
    spawn_terrain(commands, meshes, materials, &sim.terrain);
    spawn_car(commands, meshes, materials, &sim.car);
}

pub(super) fn despawn_run_scene(
    commands: &mut Commands,
    scene_query: &Query<Entity, With<RunSceneEntity>>,
) {
    for entity in scene_query {
        commands.entity(entity).despawn();
    }
}

fn spawn_terrain(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<ColorMaterial>,
    terrain: &TerrainProfile,
) {
    let fill_materials = TERRAIN_FILL_COLORS.map(|color| materials.add(color));
    let lowest_surface = terrain
        .points()
        .iter()
        .map(|point| screen_to_world(*point).y)
        .fold(f32::INFINITY, f32::min);
    let bottom = lowest_surface - TERRAIN_EXTRUSION_DEPTH;

    for (index, (a, b)) in terrain.segments().enumerate() {
        let left = screen_to_world(a);
        let right = screen_to_world(b);
        let left_base = Vec2::new(left.x, bottom);
        let right_base = Vec2::new(right.x, bottom);
        let material = fill_materials[index % fill_materials.len()].clone();

        // Counter-clockwise in world space.
        for triangle in [
            Triangle2d::new(left, left_base, right_base),
            Triangle2d::new(left, right_base, right),
        ] {
            commands.spawn((
                Name::new("TerrainFill"),
                RunSceneEntity,
                Mesh2d(meshes.add(triangle)),
                MeshMaterial2d(material.clone()),
                Transform::from_xyz(0.0, 0.0, TERRAIN_Z),
            ));
        }

        let span = right - left;
        let midpoint = (left + right) * 0.5;
        commands.spawn((
            Name::new("TerrainRidge"),
            RunSceneEntity,
            Sprite::from_color(
                TERRAIN_RIDGE_COLOR,
                Vec2::new(span.length() + TERRAIN_RIDGE_HEIGHT, TERRAIN_RIDGE_HEIGHT),
            ),
            Transform::from_translation(midpoint.extend(TERRAIN_RIDGE_Z))
                .with_rotation(Quat::from_rotation_z(span.y.atan2(span.x))),
        ));
    }
}

fn spawn_car(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<ColorMaterial>,
    car: &Car,
) {
    commands.spawn((
        Name::new("CarBody"),
        RunSceneEntity,
        CarBodyVisual,
        Sprite::from_color(CAR_BODY_COLOR, car.body.half_extents() * 2.0),
        body_transform(car),
    ));

    let wheel_material = materials.add(WHEEL_COLOR);
    for (axle, wheel) in [(WheelAxle::Back, &car.back), (WheelAxle::Front, &car.front)] {
        commands
            .spawn((
                Name::new("CarWheel"),
                RunSceneEntity,
                WheelVisual { axle },
                Mesh2d(meshes.add(Circle::new(wheel.radius))),
                MeshMaterial2d(wheel_material.clone()),
                wheel_transform(wheel),
            ))
            .with_children(|parent| {
                parent.spawn((
                    Sprite::from_color(
                        WHEEL_SPOKE_COLOR,
                        Vec2::new(wheel.radius * 1.6, wheel.radius * 0.18),
                    ),
                    Transform::from_xyz(0.0, 0.0, 0.1),
                ));
            });
    }
}

fn body_transform(car: &Car) -> Transform {
    Transform::from_translation(screen_to_world(car.body.position).extend(CAR_BODY_Z))
        .with_rotation(Quat::from_rotation_z(-car.body.angle.to_radians()))
}

/// Wheels roll without slipping, so spin follows horizontal travel.
fn wheel_transform(wheel: &Wheel) -> Transform {
    let spin = -(wheel.position.x / wheel.radius.max(f32::EPSILON));
    Transform::from_translation(screen_to_world(wheel.position).extend(WHEEL_Z))
        .with_rotation(Quat::from_rotation_z(spin))
}

pub(super) fn sync_vehicle_visuals(
    sim: Res<VehicleSim>,
    mut body_query: Query<&mut Transform, (With<CarBodyVisual>, Without<WheelVisual>)>,
    mut wheel_query: Query<(&WheelVisual, &mut Transform), Without<CarBodyVisual>>,
) {
    for mut transform in &mut body_query {
        *transform = body_transform(&sim.car);
    }

    for (visual, mut transform) in &mut wheel_query {
        let wheel = match visual.axle {
            WheelAxle::Back => &sim.car.back,
            WheelAxle::Front => &sim.car.front,
        };
        *transform = wheel_transform(wheel);
    }
}
