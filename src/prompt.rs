//! Interactive prompts.

use dialoguer::Input;

/// Error type for `prompt` operations.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// Terminal interaction failed
    #[error("Prompt error: {0}")]
    Terminal(#[from] dialoguer::Error),
}

/// Source of answers for interactive questions.
pub trait Prompter {
    /// Asks for a line of text. A blank answer returns `default`, or an empty string.
    ///
    /// # Errors
    /// Returns an error if the answer cannot be read.
    fn input(&mut self, prompt: &str, default: Option<&str>) -> Result<String, PromptError>;

    /// Asks a yes/no question; only `y` or `yes` (any case) is affirmative.
    ///
    /// # Errors
    /// Returns an error if the answer cannot be read.
    fn confirm(&mut self, prompt: &str) -> Result<bool, PromptError> {
        let answer = self.input(prompt, None)?;
        Ok(is_affirmative(&answer))
    }
}

/// `y` or `yes`, ignoring case and surrounding whitespace.
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Prompts on the controlling terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn input(&mut self, prompt: &str, default: Option<&str>) -> Result<String, PromptError> {
        let mut input = Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        Ok(input.interact_text()?.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted(Vec<&'static str>);

    impl Prompter for Scripted {
        fn input(&mut self, _prompt: &str, default: Option<&str>) -> Result<String, PromptError> {
            let answer = self.0.remove(0);
            if answer.is_empty() {
                Ok(default.unwrap_or_default().to_string())
            } else {
                Ok(answer.to_string())
            }
        }
    }

    #[test]
    fn test_affirmative_answers() {
        assert!(is_affirmative("yes"));
        assert!(is_affirmative(" Y "));
        assert!(is_affirmative("YES"));
        assert!(!is_affirmative("yep"));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("no"));
    }

    #[test]
    fn test_confirm_uses_input() {
        let mut prompter = Scripted(vec!["yes", "nope"]);
        assert!(prompter.confirm("Proceed?").unwrap());
        assert!(!prompter.confirm("Proceed?").unwrap());
    }
}
