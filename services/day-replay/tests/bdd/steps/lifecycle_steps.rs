//! BDD step definitions for replay builder and lifecycle feature

use std::sync::Arc;

use cucumber::{given, then, when};
use tokio_util::sync::CancellationToken;

use day_replay::config::{ApiConfig, Config, EntityConfig, LiveConfig};
use day_replay::ReplayBuilder;

use crate::world::ReplayWorld;

fn build_replay_builder(world: &mut ReplayWorld) -> ReplayBuilder {
    let config = Config {
        entities: world
            .lifecycle_entities
            .iter()
            .map(|entity| EntityConfig {
                entity: entity.clone(),
                name: None,
                on_states: None,
                on_state: None,
                room: None,
                layer: 1,
            })
            .collect(),
        live: LiveConfig {
            subscribe: false,
            ..LiveConfig::default()
        },
        api: ApiConfig {
            enabled: false,
            ..ApiConfig::default()
        },
        ..Config::default()
    };

    let mut builder = ReplayBuilder::new(config)
        .with_history_provider(world.history.clone())
        .with_state_reader(world.states.clone())
        .with_time_source(world.time.clone());

    if let Some(cancel) = world.lifecycle_cancel.take() {
        builder = builder.with_cancellation_token(cancel);
    }

    builder
}

// --- Given steps ---

#[given("an empty replay config")]
fn empty_replay_config(world: &mut ReplayWorld) {
    world.lifecycle_entities = Vec::new();
}

#[given(expr = "a replay config tracking {string}")]
fn replay_config_tracking(world: &mut ReplayWorld, entity_id: String) {
    world.lifecycle_entities.push(entity_id);
}

#[given("a pre-cancelled cancellation token")]
fn pre_cancelled_token(world: &mut ReplayWorld) {
    let token = CancellationToken::new();
    token.cancel();
    world.lifecycle_cancel = Some(token);
}

// --- When steps ---

#[when("the replay is built")]
async fn replay_is_built(world: &mut ReplayWorld) {
    let builder = build_replay_builder(world);
    world.lifecycle_build_succeeded = Some(builder.build().await.is_ok());
}

#[when("the replay is built and started")]
async fn replay_is_built_and_started(world: &mut ReplayWorld) {
    let builder = build_replay_builder(world);
    match builder.build().await {
        Ok(replay) => {
            world.lifecycle_build_succeeded = Some(true);
            world.lifecycle_start_succeeded = Some(replay.start().await.is_ok());
        }
        Err(_) => {
            world.lifecycle_build_succeeded = Some(false);
            world.lifecycle_start_succeeded = Some(false);
        }
    }
}

#[when("the replay is started and then cancelled")]
async fn replay_started_then_cancelled(world: &mut ReplayWorld) {
    let builder = build_replay_builder(world);
    let replay = builder.build().await.expect("build failed");
    let cancel = replay.cancellation_token();
    let engine = replay.engine();
    let task = tokio::spawn(replay.start());

    // Wait for today to be installed before shutting down
    for _ in 0..100 {
        if engine.state().read().await.timeline.is_some() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    world.engine = Some(Arc::clone(&engine));
    cancel.cancel();

    world.lifecycle_build_succeeded = Some(true);
    world.lifecycle_start_succeeded = Some(matches!(task.await, Ok(Ok(()))));
}

// --- Then steps ---

#[then("the build should succeed")]
fn build_should_succeed(world: &mut ReplayWorld) {
    assert_eq!(
        world.lifecycle_build_succeeded,
        Some(true),
        "Expected build to succeed"
    );
}

#[then("the lifecycle should complete successfully")]
fn lifecycle_should_complete(world: &mut ReplayWorld) {
    assert_eq!(
        world.lifecycle_build_succeeded,
        Some(true),
        "Expected build to succeed"
    );
    assert_eq!(
        world.lifecycle_start_succeeded,
        Some(true),
        "Expected start to succeed"
    );
}
