// Interview State Machine texts: scripted messages and LLM prompts.
// Scripted messages go to the candidate as-is; prompts go to the TextGenerator.

/// Greeting, personalised from the resume (system context carries the resume).
pub const GREETING_PROMPT: &str = "\
Поздоровайся с кандидатом. Скажи, что ты помощник с искусственным интеллектом \
и проведёшь предварительное собеседование. Обратись к кандидату по имени и отчеству, \
если они есть в резюме.";

pub const GREETING_FALLBACK: &str = "\
Здравствуйте! Я помощник с искусственным интеллектом, и сейчас я проведу \
с вами предварительное собеседование.";

pub const READINESS_QUESTION: &str = "Готовы ли вы пройти собеседование сейчас?";

/// Readiness judgement. System context; the candidate's reply is the prompt.
pub const READINESS_PROMPT: &str = "\
Кандидата спросили, готов ли он пройти собеседование сейчас. \
Ответ кандидата положительный? Напиши только да или нет.";

pub const PLAN_QUESTION: &str = "Когда вам было бы удобно запланировать интервью?";

/// Date extraction. Replace `{today}` (dd.mm.YYYY); the reply is the prompt.
pub const PLAN_DATE_PROMPT: &str = "\
Напиши дату планируемого интервью в формате dd.mm.YYYY без пояснений. \
Текущая дата {today}.";

pub const DATE_UNRESOLVED: &str = "Мы уточним удобную дату интервью дополнительно.";

pub const SECTION_NOTICE: &str = "Переходим к следующему блоку вопросов.";

pub const GOODBYE: &str = "Всего доброго. Мы с вами свяжемся.";

/// Completeness verdict. System context carries the recent dialogue.
pub const COMPLETENESS_PROMPT: &str = "\
Проанализируй последний ответ кандидата на вопрос. Ответ общий и уклончивый и \
требует уточнений, или ответ законченный и конкретный? \
Напиши без дополнительных объяснений одно из двух: \
\"Да, требует уточнений\" или \"Нет, ответ законченный\".";

pub const MARKER_COMPLETE: &str = "ответ законченный";
pub const MARKER_NEEDS_FOLLOWUP: &str = "требует уточнений";

/// Clarifying question. System context carries the recent dialogue.
pub const DETAIL_PROMPT: &str = "\
Сформулируй один уточняющий вопрос так, чтобы ответ на предыдущий вопрос стал полным.";

pub const DETAIL_FALLBACK: &str = "Не могли бы вы рассказать об этом подробнее?";
