use caravel_core::promote::{PromptProvider, ReleaseChoice, ReleasePreview};
use caravel_core::{CaravelError, Result};
use inquire::{Confirm, MultiSelect, Select};
use std::fmt;

/// Interactive terminal prompts backed by `inquire`.
pub struct InquirePrompt;

struct Choice {
    name: String,
    label: String,
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

impl PromptProvider for InquirePrompt {
    fn select_environment(&self, role: &str, options: &[String]) -> Result<String> {
        Select::new(&format!("{role} environment:"), options.to_vec())
            .prompt()
            .map_err(|e| CaravelError::Prompt(e.to_string()))
    }

    fn select_releases(&self, choices: &[ReleaseChoice]) -> Result<Vec<String>> {
        let items: Vec<Choice> = choices
            .iter()
            .map(|c| Choice {
                name: c.name.clone(),
                label: format!(
                    "{} ({} -> {})",
                    c.name,
                    c.current.as_deref().unwrap_or("none"),
                    c.incoming
                ),
            })
            .collect();
        let picked = MultiSelect::new("Releases to promote:", items)
            .prompt()
            .map_err(|e| CaravelError::Prompt(e.to_string()))?;
        Ok(picked.into_iter().map(|c| c.name).collect())
    }

    fn confirm(&self, previews: &[ReleasePreview]) -> Result<bool> {
        for preview in previews {
            println!("{}", preview.diff);
        }
        println!();
        for preview in previews {
            println!(
                "  {}: {} -> {}",
                preview.name,
                preview.from_version.as_deref().unwrap_or("none"),
                preview.to_version
            );
        }
        Confirm::new(&format!(
            "Open a pull request for {} release(s)?",
            previews.len()
        ))
        .with_default(false)
        .prompt()
        .map_err(|e| CaravelError::Prompt(e.to_string()))
    }
}
