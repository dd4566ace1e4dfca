//! Session orchestration.
//!
//! [`SessionBuilder`] wires the event bus, state tracker, batch controller,
//! reply router and command dispatcher around a set of collaborators, and
//! [`AgentSession::tick`] drives them from one control loop.

mod config;
mod session;

pub use config::SessionConfig;
pub use craftlink_router::RouteOutcome;
pub use session::{AgentSession, SessionBuilder, TickReport};
