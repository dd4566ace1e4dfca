use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use craftlink_kernel::{AgentSession, RouteOutcome, SessionBuilder, SessionConfig, TickReport};
use craftlink_protocol::{CellPos, PlanBatch, Vec3, VoxelInfo};
use craftlink_world::{
    GridWorld, InMemoryVoxelRegistry, RecordingObserver, SimulatedBody, StaticPhotoCapture,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod transport;

use crate::transport::HttpTransport;

#[derive(Debug, Parser)]
#[command(name = "craftlinkd")]
#[command(about = "Run a craftlink agent session in a headless world")]
struct Cli {
    /// Base URL of the planning service.
    #[arg(long, env = "CRAFTLINK_SERVER_URL", default_value = "http://127.0.0.1:8788")]
    server_url: String,
    /// JSON session config; missing keys take their defaults.
    #[arg(long, env = "CRAFTLINK_CONFIG")]
    config: Option<PathBuf>,
    /// Request timeout for planner calls, in seconds.
    #[arg(long, default_value_t = 30)]
    request_timeout_secs: u64,
    /// Approve every plan the planner proposes without asking.
    #[arg(long)]
    auto_approve: bool,
    /// Operator lines to say once the session starts.
    #[arg(long = "say")]
    say: Vec<String>,
    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

/// What the operator typed on stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
enum OperatorInput {
    Say(String),
    Continue(String),
    Look,
    Approve,
    Reset,
}

impl OperatorInput {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (head, rest) = line.split_once(' ').unwrap_or((line, ""));
        Some(match head {
            "/look" => Self::Look,
            "/approve" => Self::Approve,
            "/reset" => Self::Reset,
            "/continue" => Self::Continue(rest.trim().to_owned()),
            _ => Self::Say(line.to_owned()),
        })
    }
}

struct Daemon {
    session: AgentSession,
    awaiting_approval: Option<PlanBatch>,
    auto_approve: bool,
}

impl Daemon {
    fn handle_input(&mut self, input: OperatorInput) {
        match input {
            OperatorInput::Say(text) => self.session.say(text),
            OperatorInput::Continue(summary) => self.session.continue_plan(summary, Vec::new()),
            OperatorInput::Look => self.session.request_perception(),
            OperatorInput::Approve => match self.awaiting_approval.take() {
                Some(plan) => self.approve(&plan),
                None => warn!("no plan is awaiting approval"),
            },
            OperatorInput::Reset => {
                self.awaiting_approval = None;
                self.session.reset();
            }
        }
    }

    fn approve(&mut self, plan: &PlanBatch) {
        match self.session.send_plan_approval(plan) {
            Ok(()) => info!(goal_id = %plan.goal_id, items = plan.plan.len(), "plan approved"),
            Err(error) => warn!(error = %format!("{error:#}"), "plan approval not sent"),
        }
    }

    fn after_tick(&mut self, report: TickReport) {
        for outcome in report.routed {
            if let RouteOutcome::Plan(plan) = outcome {
                if self.auto_approve {
                    self.approve(&plan);
                } else {
                    info!(goal_id = %plan.goal_id, "type /approve to accept the plan");
                    self.awaiting_approval = Some(plan);
                }
            }
        }
        if let Some(rejected) = self.session.take_rejected_batch() {
            warn!(events = rejected.batch.len(), error = %rejected.error, "batch rejected before sending");
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).compact().init();
    }
}

fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<OperatorInput> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(input) = OperatorInput::parse(&line) {
                if tx.send(input).is_err() {
                    break;
                }
            }
        }
    });
    rx
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = match &cli.config {
        Some(path) => SessionConfig::from_json_file(path)?,
        None => SessionConfig::default(),
    };
    let transport = HttpTransport::new(
        cli.server_url.clone(),
        Duration::from_secs(cli.request_timeout_secs),
    )?;

    let world = Arc::new(GridWorld::new().with_floor(-1, 33, VoxelInfo::new("1", "stone")));
    world.set(CellPos::new(3, 0, 3), VoxelInfo::new("3", "wood"));
    let tick_interval = config.tick_interval();
    let session = SessionBuilder::new(Arc::new(transport))
        .config(config)
        .world(world.clone(), world)
        .body(Arc::new(SimulatedBody::at(Vec3::new(0.5, 0.0, 0.5))))
        .capture(Arc::new(StaticPhotoCapture::four_views("agent")))
        .registry(Arc::new(InMemoryVoxelRegistry::with_builtin_types()))
        .observer(Arc::new(RecordingObserver::new()))
        .build();
    info!(session_id = %session.session_id(), server = %cli.server_url, "craftlinkd started");

    let mut daemon = Daemon {
        session,
        awaiting_approval: None,
        auto_approve: cli.auto_approve,
    };
    for line in &cli.say {
        daemon.handle_input(OperatorInput::Say(line.clone()));
    }

    let mut operator = spawn_stdin_reader();
    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = daemon.session.tick(Instant::now());
                daemon.after_tick(report);
            }
            Some(input) = operator.recv() => daemon.handle_input(input),
            _ = &mut shutdown => {
                info!("shutting down");
                break;
            }
        }
    }

    daemon.session.reset();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_lines_parse() {
        assert_eq!(OperatorInput::parse("  "), None);
        assert_eq!(OperatorInput::parse("/look"), Some(OperatorInput::Look));
        assert_eq!(OperatorInput::parse("/approve"), Some(OperatorInput::Approve));
        assert_eq!(
            OperatorInput::parse("/continue walls done"),
            Some(OperatorInput::Continue("walls done".to_owned()))
        );
        assert_eq!(
            OperatorInput::parse("build a tower"),
            Some(OperatorInput::Say("build a tower".to_owned()))
        );
    }

    #[test]
    fn cli_reads_repeated_say_flags() {
        let cli = Cli::parse_from([
            "craftlinkd",
            "--server-url",
            "http://planner:1",
            "--say",
            "hi",
            "--say",
            "build",
            "--auto-approve",
        ]);
        assert_eq!(cli.say, vec!["hi".to_owned(), "build".to_owned()]);
        assert!(cli.auto_approve);
        assert_eq!(cli.server_url, "http://planner:1");
    }
}
