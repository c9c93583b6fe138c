//! Answer Completeness Classifier.
//!
//! One TextGenerator call per judgement; the answer is parsed by fixed-phrase
//! matching. Unparsable output and service failures fail open (`Complete`,
//! `Ready`) so the interview always moves forward.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::interview::prompts::{
    COMPLETENESS_PROMPT, MARKER_COMPLETE, MARKER_NEEDS_FOLLOWUP, READINESS_PROMPT,
};
use crate::interview::transcript::{render_dialogue, Turn};
use crate::llm_client::TextGenerator;

/// Number of trailing conversation turns the classifier sees.
pub const SUFFIX_TURNS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Complete,
    NeedsFollowup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    NotReady,
}

/// "ответ законченный" wins over "требует уточнений"; neither means complete.
/// Unparsable output fails open to `Complete`.
pub fn parse_verdict(text: &str) -> Verdict {
    let lower = text.to_lowercase();
    if lower.contains(MARKER_COMPLETE) {
        Verdict::Complete
    } else if lower.contains(MARKER_NEEDS_FOLLOWUP) {
        Verdict::NeedsFollowup
    } else {
        Verdict::Complete
    }
}

pub fn parse_readiness(text: &str) -> Readiness {
    if text.to_lowercase().contains("нет") {
        Readiness::NotReady
    } else {
        Readiness::Ready
    }
}

/// The last `SUFFIX_TURNS` turns of `conversation`.
pub fn suffix(conversation: &[Turn]) -> &[Turn] {
    let start = conversation.len().saturating_sub(SUFFIX_TURNS);
    &conversation[start..]
}

#[derive(Clone)]
pub struct CompletenessClassifier {
    llm: Arc<dyn TextGenerator>,
}

impl CompletenessClassifier {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }

    pub async fn classify(&self, conversation_suffix: &[Turn]) -> Verdict {
        let dialogue = render_dialogue(conversation_suffix);
        match self.llm.generate(&dialogue, COMPLETENESS_PROMPT).await {
            Ok(answer) => {
                let verdict = parse_verdict(&answer);
                debug!("Completeness verdict {verdict:?} from '{}'", answer.trim());
                verdict
            }
            Err(e) => {
                warn!("Completeness classification failed, treating answer as complete: {e}");
                Verdict::Complete
            }
        }
    }

    pub async fn readiness(&self, reply: &str) -> Readiness {
        match self.llm.generate(READINESS_PROMPT, reply).await {
            Ok(answer) => parse_readiness(&answer),
            Err(e) => {
                warn!("Readiness classification failed, assuming ready: {e}");
                Readiness::Ready
            }
        }
    }
}
