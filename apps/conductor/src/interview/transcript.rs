//! Conversation turns, folded answer records, Markdown rendering and replay of
//! the question-send sequence from a stored envelope log.

use chrono::NaiveDate;
use serde::Serialize;

use crate::mailbox::{Direction, Envelope, Session};
use crate::questions::{Phase, QuestionSet};

/// Separator between messages coalesced into one outbound envelope.
pub const MESSAGE_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Interviewer,
    Candidate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

impl Turn {
    pub fn interviewer(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Interviewer,
            text: text.into(),
        }
    }

    pub fn candidate(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Candidate,
            text: text.into(),
        }
    }
}

/// Raw text gathered for one phase question: the primary answer plus any
/// follow-up replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerRecord {
    pub phase: Phase,
    pub question: String,
    pub replies: Vec<String>,
}

impl AnswerRecord {
    pub fn new(phase: Phase, question: impl Into<String>) -> Self {
        Self {
            phase,
            question: question.into(),
            replies: Vec::new(),
        }
    }

    pub fn push(&mut self, reply: impl Into<String>) {
        self.replies.push(reply.into());
    }

    pub fn answer_text(&self) -> String {
        self.replies.join("\n")
    }
}

/// Plain dialogue rendering used as LLM system context.
pub fn render_dialogue(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|turn| match turn.speaker {
            Speaker::Interviewer => format!("Интервьюер: {}", turn.text),
            Speaker::Candidate => format!("Кандидат: {}", turn.text),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn phase_title(phase: Phase) -> &'static str {
    match phase {
        Phase::Base => "Базовые вопросы",
        Phase::RedFlag => "Чувствительные темы",
        Phase::Skill => "Навыки по вакансии",
    }
}

/// Markdown transcript of a finished session, grouped by phase.
pub fn render_markdown(
    session: &Session,
    records: &[AnswerRecord],
    planned_date: Option<NaiveDate>,
) -> String {
    let mut lines = vec![
        format!("# Собеседование {}", session.id),
        String::new(),
        format!("- Вакансия: {}", session.vacancy_ref),
        format!("- Кандидат: {}", session.candidate_ref),
        format!("- Попытка: {}", session.attempts),
    ];
    if let Some(date) = planned_date {
        lines.push(format!(
            "- Планируемая дата интервью: {}",
            date.format("%d.%m.%Y")
        ));
    }

    for phase in Phase::ALL {
        let in_phase: Vec<&AnswerRecord> = records.iter().filter(|r| r.phase == phase).collect();
        if in_phase.is_empty() {
            continue;
        }
        lines.push(String::new());
        lines.push(format!("## {}", phase_title(phase)));
        for record in in_phase {
            lines.push(String::new());
            lines.push(format!("**Вопрос:** {}", record.question));
            lines.push(String::new());
            let answer = record.answer_text();
            if answer.is_empty() {
                lines.push("_Ответа нет._".to_string());
            } else {
                lines.extend(answer.lines().map(|line| format!("> {line}")));
            }
        }
    }

    let mut md = lines.join("\n");
    md.push('\n');
    md
}

/// Rebuilds the ordered `(phase, cursor)` sequence of phase questions sent in
/// `envelopes`. Detail questions and scripted messages are skipped. A
/// question matching the first phase item while later items are expected
/// marks a restarted attempt and resets the sequence.
pub fn replay_questions(envelopes: &[Envelope], questions: &QuestionSet) -> Vec<(Phase, usize)> {
    let flat: Vec<(Phase, usize, &str)> = Phase::ALL
        .iter()
        .flat_map(|&phase| {
            questions
                .list(phase)
                .iter()
                .enumerate()
                .map(move |(idx, q)| (phase, idx, q.as_str()))
        })
        .collect();

    let mut sent = Vec::new();
    let mut next = 0usize;
    for envelope in envelopes
        .iter()
        .filter(|e| e.direction == Direction::ToCandidate)
    {
        let asked = envelope
            .body
            .rsplit(MESSAGE_SEPARATOR)
            .next()
            .unwrap_or_default();
        if let Some(&(phase, idx, q)) = flat.get(next) {
            if asked == q {
                sent.push((phase, idx));
                next += 1;
                continue;
            }
        }
        if next > 0 && flat.first().is_some_and(|&(_, _, q)| asked == q) {
            let (phase, idx, _) = flat[0];
            sent.clear();
            sent.push((phase, idx));
            next = 1;
        }
    }
    sent
}
