//! The interview graph as a plain table of `(state, signal, next-state)` triples.
//!
//! A state handler returns a `Signal`; the runner looks the pair up here.
//! `Goodbye` has no outgoing edges.

use std::fmt;

use serde::Serialize;

use crate::questions::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Greeting,
    ReadinessCheck,
    PlanInterview,
    Ask(Phase),
    Detail(Phase),
    Goodbye,
}

/// Outcome of one state handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// Handler finished; the state has a single unconditional successor.
    Done,
    Ready,
    NotReady,
    NextQuestion,
    Details,
    NextSection,
}

pub const TRANSITIONS: &[(State, Signal, State)] = &[
    (State::Greeting, Signal::Done, State::ReadinessCheck),
    (State::ReadinessCheck, Signal::Ready, State::Ask(Phase::Base)),
    (State::ReadinessCheck, Signal::NotReady, State::PlanInterview),
    (State::PlanInterview, Signal::Done, State::Goodbye),
    // base
    (State::Ask(Phase::Base), Signal::NextQuestion, State::Ask(Phase::Base)),
    (State::Ask(Phase::Base), Signal::Details, State::Detail(Phase::Base)),
    (State::Ask(Phase::Base), Signal::NextSection, State::Ask(Phase::RedFlag)),
    (State::Detail(Phase::Base), Signal::Done, State::Ask(Phase::Base)),
    // red-flag
    (State::Ask(Phase::RedFlag), Signal::NextQuestion, State::Ask(Phase::RedFlag)),
    (State::Ask(Phase::RedFlag), Signal::Details, State::Detail(Phase::RedFlag)),
    (State::Ask(Phase::RedFlag), Signal::NextSection, State::Ask(Phase::Skill)),
    (State::Detail(Phase::RedFlag), Signal::Done, State::Ask(Phase::RedFlag)),
    // skill
    (State::Ask(Phase::Skill), Signal::NextQuestion, State::Ask(Phase::Skill)),
    (State::Ask(Phase::Skill), Signal::Details, State::Detail(Phase::Skill)),
    (State::Ask(Phase::Skill), Signal::NextSection, State::Goodbye),
    (State::Detail(Phase::Skill), Signal::Done, State::Ask(Phase::Skill)),
];

/// Looks up the successor of `state` on `signal`.
pub fn next_state(state: State, signal: Signal) -> Option<State> {
    TRANSITIONS
        .iter()
        .find(|(from, on, _)| *from == state && *on == signal)
        .map(|(_, _, to)| *to)
}

impl State {
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Goodbye)
    }

    pub fn name(&self) -> &'static str {
        match self {
            State::Greeting => "greeting",
            State::ReadinessCheck => "readiness_check",
            State::PlanInterview => "plan_interview",
            State::Ask(Phase::Base) => "ask_base",
            State::Ask(Phase::RedFlag) => "ask_redflag",
            State::Ask(Phase::Skill) => "ask_skill",
            State::Detail(Phase::Base) => "ask_base_detail",
            State::Detail(Phase::RedFlag) => "ask_redflag_detail",
            State::Detail(Phase::Skill) => "ask_skill_detail",
            State::Goodbye => "goodbye",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
