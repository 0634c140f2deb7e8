//! Reset verification scenarios run against a live server
//!
//! Each scenario drives the player owned by one [`SyncClient`] and checks the
//! server's answers to `Query`. They assume the client has already joined.

use crate::network::SyncClient;
use log::info;
use rand::Rng;
use shared::{is_valid_color, PlayerState, SPAWN_X, SPAWN_Y};

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioResult {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

impl ScenarioResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed: false,
            detail: detail.into(),
        }
    }
}

/// Describes how `state` differs from the spawn defaults, if it does.
pub fn spawn_mismatch(state: &PlayerState) -> Option<String> {
    if state.is_at_spawn() {
        None
    } else {
        Some(format!(
            "expected x={}, y={}, vx=0, vy=0 but got x={}, y={}, vx={}, vy={}",
            SPAWN_X, SPAWN_Y, state.x, state.y, state.vx, state.vy
        ))
    }
}

/// Describes how the name/color of `state` drifted from `initial`, if they did.
pub fn identity_mismatch(initial: &PlayerState, state: &PlayerState) -> Option<String> {
    if state.name != initial.name {
        return Some(format!(
            "name changed from \"{}\" ({} chars) to \"{}\" ({} chars)",
            initial.name,
            initial.name.chars().count(),
            state.name,
            state.name.chars().count()
        ));
    }
    if state.color != initial.color {
        return Some(format!(
            "color changed from \"{}\" to \"{}\"",
            initial.color, state.color
        ));
    }
    if !is_valid_color(&state.color) {
        return Some(format!(
            "color \"{}\" is not #rrggbb ({} chars)",
            state.color,
            state.color.len()
        ));
    }
    None
}

pub async fn single_reset(
    client: &mut SyncClient,
) -> Result<ScenarioResult, Box<dyn std::error::Error>> {
    const NAME: &str = "Single Reset";

    let initial = client.query_state().await?;
    info!(
        "{}: initial x={}, y={}, vx={}, vy={}",
        NAME, initial.x, initial.y, initial.vx, initial.vy
    );

    client.reset(Some("single reset test")).await?;
    let state = client.query_state().await?;

    Ok(match spawn_mismatch(&state) {
        None => ScenarioResult::pass(NAME, "position and velocity back at spawn"),
        Some(detail) => ScenarioResult::fail(NAME, detail),
    })
}

pub async fn multiple_resets(
    client: &mut SyncClient,
    count: usize,
) -> Result<ScenarioResult, Box<dyn std::error::Error>> {
    const NAME: &str = "Multiple Consecutive Resets";

    for i in 1..=count {
        client.reset(Some("consecutive reset test")).await?;
        let state = client.query_state().await?;
        if let Some(detail) = spawn_mismatch(&state) {
            return Ok(ScenarioResult::fail(
                NAME,
                format!("reset {}/{}: {}", i, count, detail),
            ));
        }
    }

    Ok(ScenarioResult::pass(NAME, format!("{} resets all at spawn", count)))
}

pub async fn reset_with_movement(
    client: &mut SyncClient,
    iterations: usize,
) -> Result<ScenarioResult, Box<dyn std::error::Error>> {
    const NAME: &str = "Reset With Movement";

    for i in 1..=iterations {
        let (x, y) = {
            let mut rng = rand::thread_rng();
            (rng.gen_range(0.0..800.0f32), rng.gen_range(0.0..600.0f32))
        };

        client.move_to(x, y).await?;
        let moved = client.query_state().await?;
        if moved.x != x || moved.y != y {
            return Ok(ScenarioResult::fail(
                NAME,
                format!(
                    "iteration {}: moved to ({}, {}) but server has ({}, {})",
                    i, x, y, moved.x, moved.y
                ),
            ));
        }

        client.reset(Some("movement reset test")).await?;
        let state = client.query_state().await?;
        if let Some(detail) = spawn_mismatch(&state) {
            return Ok(ScenarioResult::fail(
                NAME,
                format!("iteration {}: {}", i, detail),
            ));
        }
    }

    Ok(ScenarioResult::pass(
        NAME,
        format!("{} move/reset cycles", iterations),
    ))
}

pub async fn string_integrity(
    client: &mut SyncClient,
    iterations: usize,
) -> Result<ScenarioResult, Box<dyn std::error::Error>> {
    const NAME: &str = "String Integrity";

    let initial = client.query_state().await?;
    if !is_valid_color(&initial.color) {
        return Ok(ScenarioResult::fail(
            NAME,
            format!(
                "initial color \"{}\" is not #rrggbb ({} chars)",
                initial.color,
                initial.color.len()
            ),
        ));
    }

    for i in 1..=iterations {
        client.reset(Some("string integrity test")).await?;
        let state = client.query_state().await?;
        if let Some(detail) = identity_mismatch(&initial, &state) {
            return Ok(ScenarioResult::fail(
                NAME,
                format!("reset {}/{}: {}", i, iterations, detail),
            ));
        }
    }

    Ok(ScenarioResult::pass(
        NAME,
        format!(
            "name \"{}\" and color \"{}\" unchanged after {} resets",
            initial.name, initial.color, iterations
        ),
    ))
}

/// Runs every scenario in order.
pub async fn run_all(
    client: &mut SyncClient,
    iterations: usize,
) -> Result<Vec<ScenarioResult>, Box<dyn std::error::Error>> {
    Ok(vec![
        single_reset(client).await?,
        multiple_resets(client, iterations).await?,
        reset_with_movement(client, iterations).await?,
        string_integrity(client, iterations).await?,
    ])
}

/// Returns (passed, total)
pub fn summarize(results: &[ScenarioResult]) -> (usize, usize) {
    let passed = results.iter().filter(|result| result.passed).count();
    (passed, results.len())
}
