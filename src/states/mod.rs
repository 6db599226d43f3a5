use crate::config::GameConfig;
use bevy::app::AppExit;
use bevy::prelude::*;

#[derive(States, Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub enum GameState {
    #[default]
    Boot,
    InRun,
    Pause,
}

/// Asks the gameplay layer to throw away the current run and start over on
/// freshly generated terrain.
#[derive(Message, Debug, Clone, Copy)]
pub struct RunRestartRequested;

pub struct GameStatePlugin;

impl Plugin for GameStatePlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<RunRestartRequested>()
            .insert_resource(ClearColor(Color::srgb(0.86, 0.91, 0.96)))
            .add_systems(Startup, setup_camera)
            .add_systems(OnEnter(GameState::Boot), enter_boot)
            .add_systems(Update, boot_to_in_run.run_if(in_state(GameState::Boot)))
            .add_systems(OnEnter(GameState::InRun), enter_in_run)
            .add_systems(Update, in_run_controls.run_if(in_state(GameState::InRun)))
            .add_systems(OnEnter(GameState::Pause), enter_pause)
            .add_systems(OnExit(GameState::Pause), cleanup_pause_screen)
            .add_systems(Update, pause_controls.run_if(in_state(GameState::Pause)));
    }
}

#[derive(Component)]
struct PauseScreenRoot;

fn setup_camera(mut commands: Commands) {
    commands.spawn(Camera2d);
}

fn enter_boot() {
    info!("Entered state: Boot");
}

/// Config loads in `Startup`; the run starts once it is available.
fn boot_to_in_run(
    config: Option<Res<GameConfig>>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    if config.is_some() {
        next_state.set(GameState::InRun);
    }
}

fn enter_in_run() {
    info!("Entered state: InRun");
}

fn in_run_controls(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut restart: MessageWriter<RunRestartRequested>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    if keyboard.just_pressed(KeyCode::Escape) {
        next_state.set(GameState::Pause);
    }

    if keyboard.just_pressed(KeyCode::KeyR) {
        restart.write(RunRestartRequested);
    }
}

fn enter_pause(mut commands: Commands) {
    commands
        .spawn((
            Name::new("PauseOverlay"),
            PauseScreenRoot,
            Node {
                width: Val::Percent(100.0),
                height: Val::Percent(100.0),
                justify_content: JustifyContent::Center,
                align_items: AlignItems::Center,
                ..default()
            },
            BackgroundColor(Color::srgba(0.01, 0.02, 0.03, 0.55)),
            ZIndex(300),
        ))
        .with_children(|parent| {
            parent.spawn((
                Text::new("PAUSED\n\nEsc - Resume\nR - Restart Run\nQ - Quit"),
                TextFont {
                    font_size: 30.0,
                    ..default()
                },
                TextColor(Color::srgb(0.94, 0.97, 1.00)),
            ));
        });

    info!("Entered state: Pause");
}

fn cleanup_pause_screen(
    mut commands: Commands,
    pause_screen_query: Query<Entity, With<PauseScreenRoot>>,
) {
    for entity in &pause_screen_query {
        commands.entity(entity).try_despawn();
    }
}

fn pause_controls(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut restart: MessageWriter<RunRestartRequested>,
    mut next_state: ResMut<NextState<GameState>>,
    mut exit: MessageWriter<AppExit>,
) {
    if keyboard.just_pressed(KeyCode::Escape) {
        next_state.set(GameState::InRun);
    }

    if keyboard.just_pressed(KeyCode::KeyR) {
        restart.write(RunRestartRequested);
        next_state.set(GameState::InRun);
    }

    if keyboard.just_pressed(KeyCode::KeyQ) {
        info!("Quit requested from pause menu.");
        exit.write(AppExit::Success);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_game_config;
    use bevy::state::app::StatesPlugin;

    fn state_app() -> App {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, StatesPlugin))
            .init_state::<GameState>()
            .add_systems(Update, boot_to_in_run.run_if(in_state(GameState::Boot)));
        app
    }

    #[test]
    fn boot_waits_for_config() {
        let mut app = state_app();
        app.update();
        app.update();

        assert_eq!(*app.world().resource::<State<GameState>>().get(), GameState::Boot);
    }

    #[test]
    fn boot_enters_run_once_config_is_loaded() {
        let mut app = state_app();
        app.insert_resource(test_game_config());
        app.update();
        app.update();

        assert_eq!(*app.world().resource::<State<GameState>>().get(), GameState::InRun);
    }
}
