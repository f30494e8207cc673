use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use chrono::Local;
use regex::Regex;

use crate::types::PromptItem;

fn blank_line() -> &'static Regex {
    static BLANK: OnceLock<Regex> = OnceLock::new();
    BLANK.get_or_init(|| Regex::new(r"\n\s*\n").expect("literal pattern"))
}

/// Split prompt text on blank lines. Surrounding whitespace is trimmed and
/// empty entries are dropped; single newlines stay inside a prompt.
pub fn parse_prompts(text: &str) -> Vec<String> {
    let text = text.replace("\r\n", "\n");
    blank_line()
        .split(&text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

/// Fresh Pending items with ids unique within this process run.
pub fn build_queue(prompts: &[String]) -> Vec<PromptItem> {
    let base = Local::now().timestamp_millis().max(0) as u64 * 1000;
    prompts
        .iter()
        .enumerate()
        .map(|(i, text)| PromptItem::new(base + i as u64, text.clone()))
        .collect()
}

/// Read and split a prompts file.
pub fn load_prompts(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading prompts from {}", path.display()))?;
    Ok(parse_prompts(&text))
}
