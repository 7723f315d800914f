use anyhow::Result;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Password, Select};

/// Interactive boundary of the auth selector. Implementations block until
/// the user answers; there is no timeout.
pub trait Prompter {
    /// Single-choice selection, returning the chosen index.
    fn select(&self, message: &str, items: &[String], default: usize) -> Result<usize>;
    fn password(&self, message: &str) -> Result<String>;
    fn confirm(&self, message: &str, default: bool) -> Result<bool>;
}

/// Prompts on the controlling terminal.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn select(&self, message: &str, items: &[String], default: usize) -> Result<usize> {
        let choice = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(message)
            .items(items)
            .default(default)
            .interact()?;
        Ok(choice)
    }

    fn password(&self, message: &str) -> Result<String> {
        let value = Password::with_theme(&ColorfulTheme::default())
            .with_prompt(message)
            .interact()?;
        Ok(value)
    }

    fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        let answer = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(message)
            .default(default)
            .interact()?;
        Ok(answer)
    }
}
