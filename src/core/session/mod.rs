//! Session lifecycle: one redirector per connection, driven by the orchestrator.

pub mod batch;
pub mod orchestrator;
pub mod redirector;

pub use batch::BatchRedirector;
pub use orchestrator::{
    triage, Collaborators, ErrorReporter, SessionOrchestrator, SessionResult, TriagePolicy,
};
pub use redirector::{RedirectorOptions, RedirectorState, TerminalRedirector};
