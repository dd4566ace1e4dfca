use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use craftlink_protocol::{
    CommandBatch, CommandId, CommandSpec, ContinuePlanPayload, EventBatch, EventPayload, GoalId,
    PlanApproval, PlanBatch, PlanItem, PlanItemId,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "craftlink-mock-planner")]
#[command(about = "Scripted planning service for local craftlink sessions")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1:8788")]
    listen: SocketAddr,
}

#[derive(Clone, Default)]
struct AppState {
    goals_minted: Arc<Mutex<u64>>,
}

impl AppState {
    fn next_goal(&self) -> GoalId {
        let mut minted = self.goals_minted.lock();
        *minted += 1;
        GoalId::from_string(format!("goal-{minted}"))
    }
}

/// What `/events` answers with.
#[derive(Debug, Clone, PartialEq)]
enum Reply {
    Plan(PlanBatch),
    Commands(CommandBatch),
    Text(String),
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self {
            Self::Plan(plan) => Json(plan).into_response(),
            Self::Commands(commands) => Json(commands).into_response(),
            Self::Text(text) => text.into_response(),
        }
    }
}

fn plan_item(id: &str, action_type: &str, description: &str, depends_on: &[&str]) -> PlanItem {
    PlanItem {
        id: PlanItemId::from_string(id),
        action_type: action_type.to_owned(),
        description: description.to_owned(),
        depends_on: depends_on.iter().map(|d| PlanItemId::from_string(*d)).collect(),
    }
}

/// Speech becomes a plan; a continue request becomes a single step; anything
/// else is acknowledged with text.
fn reply_to_events(batch: &EventBatch, state: &AppState) -> Reply {
    let payloads = || batch.events.iter().filter_map(|event| event.payload.as_ref());

    let speech = payloads()
        .filter_map(|payload| match payload {
            EventPayload::Speech(speech) => Some(speech.text.trim()),
            _ => None,
        })
        .filter(|text| !text.is_empty())
        .last();
    if let Some(text) = speech {
        return Reply::Plan(speech_plan(text, state.next_goal(), batch));
    }

    let resumed = payloads().find_map(|payload| match payload {
        EventPayload::ContinuePlan(resume) => Some(resume),
        _ => None,
    });
    if let Some(resume) = resumed {
        return Reply::Commands(continue_step(resume, batch, state));
    }

    Reply::Text(format!("noted {} event(s)", batch.events.len()))
}

fn speech_plan(text: &str, goal_id: GoalId, batch: &EventBatch) -> PlanBatch {
    let lowered = text.to_lowercase();
    let plan = if lowered.contains("hello") || lowered.contains("hi ") || lowered == "hi" {
        Vec::new()
    } else if lowered.contains("clear") || lowered.contains("destroy") {
        vec![plan_item("p1", "destroy_block", "Clear the cells ahead", &[])]
    } else {
        vec![
            plan_item("p1", "move_to", "Step forward one cell", &[]),
            plan_item("p2", "place_block", "Stack three stone blocks", &["p1"]),
        ]
    };
    let talk = if plan.is_empty() {
        "Hello! Tell me what to build.".to_owned()
    } else {
        format!("I can do that: {text}")
    };
    PlanBatch {
        goal_id,
        goal_label: text.to_owned(),
        session_id: batch.session_id.clone(),
        talk_to_player: Some(talk),
        plan,
    }
}

fn continue_step(
    resume: &ContinuePlanPayload,
    batch: &EventBatch,
    state: &AppState,
) -> CommandBatch {
    let goal_id = batch
        .game_state
        .as_ref()
        .and_then(|snapshot| snapshot.pending_plans.first())
        .map(|entry| entry.goal_id.clone())
        .unwrap_or_else(|| state.next_goal());
    info!(%goal_id, summary = %resume.summary, "continuing plan");
    CommandBatch {
        goal_id,
        goal_label: None,
        session_id: batch.session_id.clone(),
        commands: vec![CommandSpec {
            id: format!("continue-{}", batch.events.len()).into(),
            goal_id: None,
            goal_label: None,
            command_type: "move_to".to_owned(),
            params: r#"{"expand_direction":"forward","count":1}"#.to_owned(),
            phase: None,
        }],
    }
}

fn params_for(action_type: &str) -> &'static str {
    match action_type {
        "place_block" => {
            r#"{"start_offset":{"x":0,"y":0,"z":1},"expand_direction":"up","count":3,"voxel_name":"stone"}"#
        }
        "destroy_block" => r#"{"start_offset":{"z":1},"expand_direction":"forward","count":3}"#,
        "move_to" => r#"{"expand_direction":"forward","count":1}"#,
        _ => "{}",
    }
}

/// One command per approved item, reusing the item id so the agent retires
/// the matching pending plan entry. Labels are left to the agent to fill in.
fn commands_for(approval: &PlanApproval) -> CommandBatch {
    CommandBatch {
        goal_id: approval.goal_id.clone(),
        goal_label: None,
        session_id: approval.session_id.clone(),
        commands: approval
            .plan
            .iter()
            .map(|item| CommandSpec {
                id: CommandId::from_string(item.id.as_str()),
                goal_id: None,
                goal_label: None,
                command_type: item.action_type.clone(),
                params: params_for(&item.action_type).to_owned(),
                phase: None,
            })
            .collect(),
    }
}

async fn healthz() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "craftlink-mock-planner"
    }))
}

async fn events(State(state): State<AppState>, Json(batch): Json<EventBatch>) -> Reply {
    info!(session_id = %batch.session_id, events = batch.events.len(), "events received");
    reply_to_events(&batch, &state)
}

async fn plan_permission(Json(approval): Json<PlanApproval>) -> Json<CommandBatch> {
    info!(goal_id = %approval.goal_id, items = approval.plan.len(), "plan approved");
    Json(commands_for(&approval))
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/events", post(events))
        .route("/plan-permission", post(plan_permission))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .compact()
        .init();

    let cli = Cli::parse();
    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!(listen = %cli.listen, "craftlink-mock-planner listening");

    axum::serve(listener, app(AppState::default()))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use craftlink_protocol::{Event, SessionId, SpeechPayload};

    fn batch(events: Vec<Event>) -> EventBatch {
        EventBatch {
            session_id: SessionId::from_string("s1"),
            events,
            game_state: None,
        }
    }

    #[test]
    fn speech_yields_a_plan() -> Result<()> {
        let state = AppState::default();
        let reply = reply_to_events(
            &batch(vec![Event::new("000001", SpeechPayload::new("build a tower"))]),
            &state,
        );
        let Reply::Plan(plan) = reply else {
            anyhow::bail!("expected a plan, got {reply:?}");
        };
        assert_eq!(plan.goal_id.as_str(), "goal-1");
        assert_eq!(plan.goal_label, "build a tower");
        assert_eq!(plan.plan.len(), 2);
        assert_eq!(plan.plan[1].depends_on[0].as_str(), "p1");
        Ok(())
    }

    #[test]
    fn greeting_yields_an_empty_plan_with_message() -> Result<()> {
        let reply = reply_to_events(
            &batch(vec![Event::new("000001", SpeechPayload::new("hello"))]),
            &AppState::default(),
        );
        let Reply::Plan(plan) = reply else {
            anyhow::bail!("expected a plan, got {reply:?}");
        };
        assert!(plan.plan.is_empty());
        assert!(plan.talk_to_player.is_some());
        Ok(())
    }

    #[test]
    fn continue_request_yields_one_command() -> Result<()> {
        let reply = reply_to_events(
            &batch(vec![Event::new(
                "000002",
                ContinuePlanPayload::new("walls up", Vec::new(), Vec::new()),
            )]),
            &AppState::default(),
        );
        let Reply::Commands(commands) = reply else {
            anyhow::bail!("expected commands, got {reply:?}");
        };
        assert_eq!(commands.commands.len(), 1);
        assert_eq!(commands.commands[0].command_type, "move_to");
        Ok(())
    }

    #[test]
    fn other_events_get_text() {
        let reply = reply_to_events(&batch(Vec::new()), &AppState::default());
        assert_eq!(reply, Reply::Text("noted 0 event(s)".to_owned()));
    }

    #[test]
    fn approval_maps_items_to_commands() {
        let approval = PlanApproval {
            goal_id: GoalId::from_string("g7"),
            goal_label: "tower".to_owned(),
            session_id: SessionId::from_string("s1"),
            plan: vec![
                plan_item("p1", "move_to", "", &[]),
                plan_item("p2", "place_block", "", &["p1"]),
            ],
        };
        let commands = commands_for(&approval);
        assert_eq!(commands.goal_id.as_str(), "g7");
        assert_eq!(commands.commands[0].id.as_str(), "p1");
        assert_eq!(commands.commands[1].command_type, "place_block");
        assert!(commands.commands[1].params.contains("\"count\":3"));
    }
}
