// Shared prompt fragments and prompt-building utilities.
// Each module that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting fragments.

/// Appended to every prompt whose answer is parsed line by line.
pub const PLAIN_LINES_INSTRUCTION: &str = "\
    Каждый вопрос должен быть в отдельной строке. \
    Ответ не должен включать пояснения, заголовки и дополнительную информацию.";

/// Appended to prompts whose answer is sent to the candidate verbatim.
pub const VERBATIM_INSTRUCTION: &str = "\
    Ответ должен содержать только текст сообщения для кандидата, без пояснений и пометок.";

/// Builds the system context that carries a document into a call.
pub fn document_context(label: &str, text: &str) -> String {
    format!("{label}: {}", text.trim())
}
