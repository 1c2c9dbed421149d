//! Domain model for persona-driven UX test runs.
//!
//! Everything here is synchronous and free of I/O except the config,
//! persona and report loaders. Async orchestration lives in `persona-runner`.

pub mod backoff;
pub mod chain;
pub mod config;
pub mod events;
pub mod extract;
pub mod history;
pub mod loop_detector;
pub mod persona;
pub mod phase;
pub mod prompt;
pub mod report;
pub mod result;
pub mod settings;
pub mod task;
pub mod types;

pub use config::Config;
pub use history::{AgentHistory, ModelAction};
pub use loop_detector::{LoopDetection, LoopDetector, LoopDetectorConfig};
pub use persona::{ConversationGoal, PersonaDefinition};
pub use phase::PhaseTracker;
pub use prompt::Guidance;
pub use report::ReportWriter;
pub use result::TestRunResult;
pub use settings::ProviderSettings;
pub use task::TaskBuilder;
pub use types::*;
