// Question Set Builder LLM prompt templates.
// Placeholders in braces are replaced before sending.

/// Baseline list. Replace `{rubric}`.
pub const BASE_QUESTIONS_PROMPT: &str = "\
Сформулируй краткий список вопросов кандидату по следующим темам:
{rubric}
{plain_lines}";

/// Red-flag list. Replace `{rubric}`.
pub const REDFLAG_QUESTIONS_PROMPT: &str = "\
Сформулируй краткий список вопросов кандидату по следующим чувствительным темам:
{rubric}
{plain_lines}";

/// Short classification call that yields the gender signal.
pub const GENDER_PROMPT: &str = "Напиши кратко пол кандидата: мужчина или женщина?";

/// Red-flag filter. System context carries the question list.
/// Replace `{resume}` and `{gender_rule}`.
pub const REDFLAG_FILTER_PROMPT: &str = "\
Резюме кандидата: {resume}

Убери из списка вопросы, ответ на которые уже есть в резюме.
{gender_rule}
{plain_lines}";

pub const GENDER_RULE_MALE: &str =
    "Вопросы о беременности и детях задаются только кандидату-женщине. Кандидат — мужчина, убери такие вопросы.";
pub const GENDER_RULE_FEMALE: &str =
    "Вопросы о беременности и детях задаются только кандидату-женщине. Кандидат — женщина.";
pub const GENDER_RULE_UNKNOWN: &str =
    "Пол кандидата не удалось определить, вопросы о беременности и детях убери.";

/// Skill list from the vacancy (system context carries the vacancy).
pub const SKILL_QUESTIONS_PROMPT: &str = "\
Сформулируй краткий список вопросов кандидату по списку требований вакансии.
{plain_lines}";

/// Skill filter. System context carries the question list. Replace `{resume}`.
pub const SKILL_FILTER_PROMPT: &str = "\
Резюме кандидата: {resume}

Убери из списка вопросы, ответ на которые уже есть в резюме.
{plain_lines}";
