//! Interview date planning for candidates who are not ready right now.
//!
//! The LLM is asked for a `dd.mm.YYYY` date first. When its answer holds no
//! usable date, Russian relative expressions in the reply are resolved
//! against today.

use std::sync::Arc;

use chrono::{Datelike, Days, NaiveDate, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::interview::prompts::{DATE_UNRESOLVED, PLAN_DATE_PROMPT};
use crate::llm_client::TextGenerator;

pub const DATE_FORMAT: &str = "%d.%m.%Y";

static DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})\.(\d{1,2})\.(\d{4})\b").expect("valid regex"));

/// Weekday stems in the forms a reply is likely to use ("в среду", "пятница").
const WEEKDAYS: &[(&str, Weekday)] = &[
    ("понедельник", Weekday::Mon),
    ("вторник", Weekday::Tue),
    ("среду", Weekday::Wed),
    ("среда", Weekday::Wed),
    ("четверг", Weekday::Thu),
    ("пятниц", Weekday::Fri),
    ("суббот", Weekday::Sat),
    ("воскресень", Weekday::Sun),
];

/// First valid `dd.mm.YYYY` date in `text`.
pub fn extract_date(text: &str) -> Option<NaiveDate> {
    DATE.captures_iter(text).find_map(|caps| {
        let day = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let year = caps[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

/// Resolves relative expressions: сегодня, завтра, послезавтра, через неделю
/// and weekday names (next occurrence, never today).
pub fn infer_date(reply: &str, today: NaiveDate) -> Option<NaiveDate> {
    let lower = reply.to_lowercase();
    if lower.contains("послезавтра") {
        return today.checked_add_days(Days::new(2));
    }
    if lower.contains("завтра") {
        return today.checked_add_days(Days::new(1));
    }
    if lower.contains("сегодня") {
        return Some(today);
    }
    if lower.contains("через неделю") {
        return today.checked_add_days(Days::new(7));
    }
    let (_, weekday) = WEEKDAYS.iter().find(|(stem, _)| lower.contains(stem))?;
    let from = today.weekday().num_days_from_monday();
    let to = weekday.num_days_from_monday();
    let ahead = match (7 + to - from) % 7 {
        0 => 7,
        n => n,
    };
    today.checked_add_days(Days::new(u64::from(ahead)))
}

/// Scripted confirmation echoed back to the candidate.
pub fn confirmation(date: Option<NaiveDate>) -> String {
    match date {
        Some(date) => format!("Планируемая дата: {}", date.format(DATE_FORMAT)),
        None => DATE_UNRESOLVED.to_string(),
    }
}

#[derive(Clone)]
pub struct DatePlanner {
    llm: Arc<dyn TextGenerator>,
}

impl DatePlanner {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }

    /// Dates before `today` are never accepted.
    pub async fn plan(&self, reply: &str, today: NaiveDate) -> Option<NaiveDate> {
        let system = PLAN_DATE_PROMPT.replace("{today}", &today.format(DATE_FORMAT).to_string());
        let from_llm = match self.llm.generate(&system, reply).await {
            Ok(answer) => extract_date(&answer).filter(|d| *d >= today),
            Err(e) => {
                warn!("Date extraction call failed: {e}");
                None
            }
        };
        let date = from_llm.or_else(|| infer_date(reply, today));
        debug!("Planned interview date for reply '{}': {date:?}", reply.trim());
        date
    }
}
