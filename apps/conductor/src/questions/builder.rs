//! Question Set Builder: produces the three ordered phase lists for a session.
//!
//! Flow: baseline (rubric + resume) → red-flag (rubric, filtered by resume and
//!       gender signal) → skill (vacancy requirements, filtered by resume) →
//!       markup cleanup.
//!
//! Any generation failure aborts the whole build: a session never runs on a
//! partial question set.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::llm_client::prompts::{document_context, PLAIN_LINES_INSTRUCTION};
use crate::llm_client::{LlmError, TextGenerator};
use crate::mailbox::Documents;
use crate::questions::cleanup::clean_lines;
use crate::questions::prompts::{
    BASE_QUESTIONS_PROMPT, GENDER_PROMPT, GENDER_RULE_FEMALE, GENDER_RULE_MALE,
    GENDER_RULE_UNKNOWN, REDFLAG_FILTER_PROMPT, REDFLAG_QUESTIONS_PROMPT, SKILL_FILTER_PROMPT,
    SKILL_QUESTIONS_PROMPT,
};
use crate::questions::rubric::Rubrics;

/// Substrings marking family-planning questions, which only apply to female candidates.
const FAMILY_TOPIC_MARKERS: &[&str] = &["беремен", "декрет", "дети", "детей", "ребён", "ребен"];

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

/// Question categories, executed in this fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Base,
    RedFlag,
    Skill,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Base, Phase::RedFlag, Phase::Skill];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Base => "base",
            Phase::RedFlag => "redflag",
            Phase::Skill => "skill",
        }
    }

    /// The phase that follows this one; `None` after the last.
    pub fn next(&self) -> Option<Phase> {
        match self {
            Phase::Base => Some(Phase::RedFlag),
            Phase::RedFlag => Some(Phase::Skill),
            Phase::Skill => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three phase lists. Generated once per session, never mutated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionSet {
    pub base: Vec<String>,
    pub redflag: Vec<String>,
    pub skill: Vec<String>,
}

impl QuestionSet {
    pub fn list(&self, phase: Phase) -> &[String] {
        match phase {
            Phase::Base => &self.base,
            Phase::RedFlag => &self.redflag,
            Phase::Skill => &self.skill,
        }
    }

    pub fn total(&self) -> usize {
        self.base.len() + self.redflag.len() + self.skill.len()
    }
}

/// Gender signal derived from the resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
    Unknown,
}

impl Gender {
    /// Fixed-phrase parse of the classification answer.
    pub fn parse(answer: &str) -> Gender {
        let lower = answer.to_lowercase();
        let female = lower.contains("женщ") || lower.contains("женский");
        let male = lower.contains("мужч") || lower.contains("мужской");
        match (male, female) {
            (true, false) => Gender::Male,
            (false, true) => Gender::Female,
            _ => Gender::Unknown,
        }
    }

    fn filter_rule(&self) -> &'static str {
        match self {
            Gender::Male => GENDER_RULE_MALE,
            Gender::Female => GENDER_RULE_FEMALE,
            Gender::Unknown => GENDER_RULE_UNKNOWN,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Builder
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct QuestionSetBuilder {
    llm: Arc<dyn TextGenerator>,
    rubrics: Rubrics,
}

impl QuestionSetBuilder {
    pub fn new(llm: Arc<dyn TextGenerator>, rubrics: Rubrics) -> Self {
        Self { llm, rubrics }
    }

    pub async fn build(&self, documents: &Documents) -> Result<QuestionSet, LlmError> {
        let resume = documents.resume_text.trim();
        let vacancy = documents.vacancy_text.trim();

        let base = self.base_questions(resume).await?;
        let redflag = self.redflag_questions(resume).await?;
        let skill = self.skill_questions(vacancy, resume).await?;

        let set = QuestionSet {
            base,
            redflag,
            skill,
        };
        info!(
            "Question set built: base={}, redflag={}, skill={}",
            set.base.len(),
            set.redflag.len(),
            set.skill.len()
        );
        Ok(set)
    }

    async fn base_questions(&self, resume: &str) -> Result<Vec<String>, LlmError> {
        let prompt = BASE_QUESTIONS_PROMPT
            .replace("{rubric}", &self.rubrics.base)
            .replace("{plain_lines}", PLAIN_LINES_INSTRUCTION);
        let raw = self.llm.generate(&resume_context(resume), &prompt).await?;
        let questions = clean_lines(&raw);
        if questions.is_empty() {
            debug!("Baseline generation produced no usable lines; using rubric");
            return Ok(self.rubrics.base_fallback());
        }
        Ok(questions)
    }

    async fn redflag_questions(&self, resume: &str) -> Result<Vec<String>, LlmError> {
        let prompt = REDFLAG_QUESTIONS_PROMPT
            .replace("{rubric}", &self.rubrics.redflag)
            .replace("{plain_lines}", PLAIN_LINES_INSTRUCTION);
        let raw = self.llm.generate(&resume_context(resume), &prompt).await?;
        let candidates = clean_lines(&raw);
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let gender = self.detect_gender(resume).await?;
        debug!("Gender signal: {gender:?}");

        let filter_prompt = REDFLAG_FILTER_PROMPT
            .replace("{resume}", or_missing(resume))
            .replace("{gender_rule}", gender.filter_rule())
            .replace("{plain_lines}", PLAIN_LINES_INSTRUCTION);
        let filtered = self
            .llm
            .generate(&question_list_context(&candidates), &filter_prompt)
            .await?;

        Ok(drop_inapplicable(clean_lines(&filtered), gender))
    }

    async fn detect_gender(&self, resume: &str) -> Result<Gender, LlmError> {
        if resume.is_empty() {
            return Ok(Gender::Unknown);
        }
        let answer = self
            .llm
            .generate(&resume_context(resume), GENDER_PROMPT)
            .await?;
        Ok(Gender::parse(&answer))
    }

    async fn skill_questions(&self, vacancy: &str, resume: &str) -> Result<Vec<String>, LlmError> {
        if vacancy.is_empty() {
            return Ok(Vec::new());
        }
        let prompt = SKILL_QUESTIONS_PROMPT.replace("{plain_lines}", PLAIN_LINES_INSTRUCTION);
        let raw = self
            .llm
            .generate(&document_context("вакансия", vacancy), &prompt)
            .await?;
        let candidates = clean_lines(&raw);
        if candidates.is_empty() || resume.is_empty() {
            return Ok(candidates);
        }

        let filter_prompt = SKILL_FILTER_PROMPT
            .replace("{resume}", resume)
            .replace("{plain_lines}", PLAIN_LINES_INSTRUCTION);
        let filtered = self
            .llm
            .generate(&question_list_context(&candidates), &filter_prompt)
            .await?;
        Ok(clean_lines(&filtered))
    }
}

fn or_missing(text: &str) -> &str {
    if text.is_empty() {
        "не предоставлено"
    } else {
        text
    }
}

fn resume_context(resume: &str) -> String {
    document_context("резюме", or_missing(resume))
}

fn question_list_context(questions: &[String]) -> String {
    document_context("список вопросов", &questions.join("\n"))
}

/// Family-planning questions survive only for a female gender signal.
fn drop_inapplicable(questions: Vec<String>, gender: Gender) -> Vec<String> {
    if gender == Gender::Female {
        return questions;
    }
    questions
        .into_iter()
        .filter(|q| {
            let lower = q.to_lowercase();
            !FAMILY_TOPIC_MARKERS.iter().any(|m| lower.contains(m))
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
