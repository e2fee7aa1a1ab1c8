//! Operator decisions.
//!
//! The provisioning flow never reads the terminal directly; it asks a [`Prompt`], so tests
//! can script the answers.

use std::collections::VecDeque;

use dialoguer::{theme::ColorfulTheme, Input};

use crate::GatewayError;

/// Interpretation of a yes/no answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    /// `quit` or `exit`: abandon the current branch.
    Quit,
}

impl Answer {
    /// Parse a free-form answer; `None` when it is none of the accepted words.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Some(Self::Yes),
            "n" | "no" => Some(Self::No),
            "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

pub trait Prompt {
    /// Ask a free-form question and return the raw answer.
    fn ask(&mut self, question: &str) -> Result<String, GatewayError>;

    /// Show a message that needs no answer.
    fn say(&mut self, message: &str);

    /// Ask a yes/no question until a recognised answer is given.
    fn confirm(&mut self, question: &str) -> Result<Answer, GatewayError> {
        let question = format!("{question} (y/n)");
        loop {
            let input = self.ask(&question)?;
            if let Some(answer) = Answer::parse(&input) {
                return Ok(answer);
            }
            self.say("Please respond with yes/no! (`exit` or `quit` to return)");
        }
    }
}

/// Interactive terminal prompt.
pub struct TerminalPrompt {
    theme: ColorfulTheme,
}

impl TerminalPrompt {
    #[must_use]
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompt for TerminalPrompt {
    fn ask(&mut self, question: &str) -> Result<String, GatewayError> {
        Input::<String>::with_theme(&self.theme)
            .with_prompt(question)
            .allow_empty(true)
            .interact_text()
            .map_err(|err| GatewayError::Prompt(err.to_string()))
    }

    fn say(&mut self, message: &str) {
        println!("{message}");
    }
}

/// Prompt answering from a fixed script; running out of answers is an error.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: VecDeque<String>,
    /// Every question asked and message shown, in order.
    pub transcript: Vec<String>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            transcript: Vec::new(),
        }
    }
}

impl Prompt for ScriptedPrompt {
    fn ask(&mut self, question: &str) -> Result<String, GatewayError> {
        self.transcript.push(question.to_string());
        self.answers
            .pop_front()
            .ok_or_else(|| GatewayError::Prompt(format!("no scripted answer for `{question}`")))
    }

    fn say(&mut self, message: &str) {
        self.transcript.push(message.to_string());
    }
}
