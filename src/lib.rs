//! Record a browser task once under model guidance, then replay it
//! deterministically from the recorded trace.
//!
//! Write path: [`learn::record_trace`] drives a session, [`normalize`] turns
//! the agent's actions into [`Step`]s and [`secrets`] swaps secret literals
//! for `{{NAME}}` placeholders. Read path: [`vars`] binds the placeholders,
//! [`selector`] picks DOM selectors and [`replay`] walks the trace.

pub mod brain;
pub mod config;
pub mod dom;
pub mod envelope;
pub mod error;
pub mod hands;
pub mod learn;
pub mod logging;
pub mod normalize;
pub mod page;
pub mod replay;
pub mod secrets;
pub mod selector;
pub mod store;
pub mod types;
pub mod vars;

pub use config::Config;
pub use envelope::{NO_RESULT, ResultEnvelope};
pub use error::ReplayError;
pub use learn::{LearnOptions, record_trace};
pub use replay::{ReplayOptions, ReplayOutcome, list_needed_variables, replay_trace};
pub use types::{ElementMetadata, Step, TraceMetadata};
