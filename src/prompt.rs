//! Interactive collection of run settings.
//!
//! Generic over the input and output streams so the CLI uses stdin/stdout and
//! tests use in-memory buffers. Nothing in the engine calls this.

use std::io::{self, BufRead, Write};
use thiserror::Error;

use crate::config::{parse_number, RunConfig};
use crate::errors::ConfigError;
use crate::utils::{normalize_url, parse_duration_string};

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("Failed to read input: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Prints `question` and returns the trimmed answer. End of input counts as empty.
    fn ask(&mut self, question: &str) -> Result<String, PromptError> {
        write!(self.output, "{}", question)?;
        self.output.flush()?;
        let mut line = String::new();
        self.input.read_line(&mut line)?;
        Ok(line.trim().to_string())
    }

    /// Asks for each core setting, using the values already in `config` as defaults.
    pub fn collect_config(&mut self, mut config: RunConfig) -> Result<RunConfig, PromptError> {
        let answer = self.ask(&format!(
            "Enter number of concurrent users (default {}): ",
            config.num_users
        ))?;
        if !answer.is_empty() {
            config.num_users = parse_number("number of concurrent users", &answer)?;
        }

        let answer = self.ask(&format!(
            "Enter test duration in seconds (default {}): ",
            config.duration.as_secs()
        ))?;
        if !answer.is_empty() {
            config.duration =
                parse_duration_string(&answer).map_err(|message| ConfigError::InvalidDuration {
                    field: "test duration".to_string(),
                    value: answer.clone(),
                    message,
                })?;
        }

        let answer = self.ask(&format!(
            "Enter requests per user (default {}): ",
            config.requests_per_user
        ))?;
        if !answer.is_empty() {
            config.requests_per_user = parse_number("requests per user", &answer)?;
        }

        let question = if config.target_url.is_empty() {
            "Enter target URL: ".to_string()
        } else {
            format!("Enter target URL (default {}): ", config.target_url)
        };
        let answer = self.ask(&question)?;
        if !answer.is_empty() {
            config.target_url = normalize_url(&answer);
        } else if config.target_url.is_empty() {
            return Err(ConfigError::MissingUrl.into());
        }

        Ok(config)
    }

    /// Warns about the load and asks for a go-ahead. Only "y" proceeds.
    pub fn confirm(&mut self, target_url: &str) -> Result<bool, PromptError> {
        writeln!(
            self.output,
            "\nWarning: This will generate heavy load on {}",
            target_url
        )?;
        let answer = self.ask("Continue? (y/N): ")?;
        Ok(answer.eq_ignore_ascii_case("y"))
    }
}
