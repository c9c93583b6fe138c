// Question Set Builder: baseline, red-flag and skill lists for one session.
// All LLM calls go through the TextGenerator trait.

pub mod builder;
pub mod cleanup;
pub mod prompts;
pub mod rubric;

pub use builder::{Phase, QuestionSet, QuestionSetBuilder};
