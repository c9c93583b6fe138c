use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::questions::cleanup::clean_lines;

/// Built-in baseline rubric. Each line doubles as a fallback question.
pub const DEFAULT_BASE_RUBRIC: &str = "\
Расскажите о своём опыте работы по специальности.
Почему вы ищете новую работу?
Какие у вас ожидания по заработной плате?
Какой формат работы вам подходит: офис, удалённо или гибрид?
Готовы ли вы к командировкам или переезду?
Когда вы сможете приступить к работе?";

/// Built-in sensitive-topics rubric.
pub const DEFAULT_REDFLAG_RUBRIC: &str = "\
Частая смена мест работы и причины увольнений.
Длительные перерывы в трудовой деятельности.
Наличие судимости.
Беременность и наличие маленьких детей.
Ограничения по здоровью, мешающие выполнению работы.
Финансовые обязательства, которые могут повлиять на работу.";

#[derive(Debug, Clone)]
pub struct Rubrics {
    pub base: String,
    pub redflag: String,
}

impl Default for Rubrics {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE_RUBRIC.to_string(),
            redflag: DEFAULT_REDFLAG_RUBRIC.to_string(),
        }
    }
}

impl Rubrics {
    /// Loads rubric overrides from disk; a missing path keeps the built-in text.
    pub async fn load(base_path: Option<&Path>, redflag_path: Option<&Path>) -> Result<Self> {
        let mut rubrics = Rubrics::default();
        if let Some(path) = base_path {
            rubrics.base = read_rubric(path).await?;
            info!("Loaded baseline rubric from {}", path.display());
        }
        if let Some(path) = redflag_path {
            rubrics.redflag = read_rubric(path).await?;
            info!("Loaded red-flag rubric from {}", path.display());
        }
        Ok(rubrics)
    }

    /// Baseline rubric as a question list, used when generation yields nothing usable.
    pub fn base_fallback(&self) -> Vec<String> {
        clean_lines(&self.base)
    }
}

async fn read_rubric(path: &Path) -> Result<String> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read rubric file '{}'", path.display()))?;
    if text.trim().is_empty() {
        anyhow::bail!("Rubric file '{}' is empty", path.display());
    }
    Ok(text)
}
