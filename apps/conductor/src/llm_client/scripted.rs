//! Scripted `TextGenerator` used by unit tests.
//!
//! Rules match when their needle occurs in the system context or the prompt;
//! the first registered rule wins.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{LlmError, TextGenerator};

enum Reply {
    Text(String),
    Fail,
}

struct Rule {
    needle: String,
    replies: VecDeque<Reply>,
}

#[derive(Default)]
pub struct ScriptedGenerator {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<(String, String)>>,
    fallback: Option<String>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answers `reply` when `needle` matches.
    pub fn on(self, needle: &str, reply: &str) -> Self {
        self.push_rule(needle, vec![Reply::Text(reply.to_string())])
    }

    /// Answers `replies` in order; the last one repeats once the rest are used up.
    pub fn on_sequence(self, needle: &str, replies: &[&str]) -> Self {
        let replies = replies.iter().map(|r| Reply::Text(r.to_string())).collect();
        self.push_rule(needle, replies)
    }

    /// Fails every call whose context matches `needle`.
    pub fn failing(self, needle: &str) -> Self {
        self.push_rule(needle, vec![Reply::Fail])
    }

    /// Answer for calls no rule matches. Without one, unmatched calls fail.
    pub fn otherwise(mut self, reply: &str) -> Self {
        self.fallback = Some(reply.to_string());
        self
    }

    fn push_rule(self, needle: &str, replies: Vec<Reply>) -> Self {
        self.rules.lock().unwrap().push(Rule {
            needle: needle.to_string(),
            replies: replies.into(),
        });
        self
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls whose system context or prompt contained `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(system, prompt)| system.contains(needle) || prompt.contains(needle))
            .count()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        self.calls
            .lock()
            .unwrap()
            .push((system.to_string(), prompt.to_string()));

        let mut rules = self.rules.lock().unwrap();
        let rule = rules
            .iter_mut()
            .find(|r| system.contains(&r.needle) || prompt.contains(&r.needle));

        let reply = match rule {
            Some(rule) => {
                let reply = if rule.replies.len() > 1 {
                    rule.replies.pop_front()
                } else {
                    rule.replies.front().map(|r| match r {
                        Reply::Text(t) => Reply::Text(t.clone()),
                        Reply::Fail => Reply::Fail,
                    })
                };
                reply.unwrap_or(Reply::Fail)
            }
            None => match &self.fallback {
                Some(text) => Reply::Text(text.clone()),
                None => Reply::Fail,
            },
        };

        match reply {
            Reply::Text(text) => Ok(text),
            Reply::Fail => Err(LlmError::Api {
                status: 500,
                message: "scripted failure".to_string(),
            }),
        }
    }
}
