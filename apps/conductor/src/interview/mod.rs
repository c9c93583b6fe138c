// Interview State Machine: one instance per claimed session, driving the
// mailbox exchange through the transition table in graph.rs.

pub mod completeness;
pub mod graph;
pub mod machine;
pub mod prompts;
pub mod scheduling;
pub mod transcript;

pub use machine::{InterviewError, InterviewMachine, InterviewOutcome, WaitBudget};
