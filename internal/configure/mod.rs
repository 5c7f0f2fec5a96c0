use crate::shared::config::{self, ConfigError, Configuration};
use crate::shared::logging::mask_secret;
use crate::shared::models::constants::MAX_SYNC_INTERVAL_MINUTES;
use anyhow::{bail, Context, Result};
use std::io::{self, BufRead, Write};
use std::path::Path;

/// Values collected by the interactive prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answers {
    pub panel_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub variable_name: String,
    pub target_url: String,
    pub auto_sync: bool,
    pub sync_interval_minutes: i64,
    pub allow_implicit_create: bool,
}

impl Answers {
    /// Copy the prompted fields onto `cfg`, leaving everything else
    /// (last sync time, cookie source, control address) untouched.
    pub fn apply_to(&self, cfg: &mut Configuration) {
        cfg.panel_url = self.panel_url.trim().to_string();
        cfg.client_id = self.client_id.trim().to_string();
        cfg.client_secret = self.client_secret.trim().to_string();
        cfg.variable_name = self.variable_name.trim().to_string();
        cfg.target_url = self.target_url.trim().to_string();
        cfg.auto_sync = self.auto_sync;
        cfg.sync_interval_minutes = self.sync_interval_minutes;
        cfg.allow_implicit_create = self.allow_implicit_create;
    }
}

pub fn run(path: &Path) -> Result<Configuration> {
    let current = config::load_or_default(path)?;

    println!("qlsync needs your panel's application credentials.");
    println!("Press enter to accept the value in brackets.");
    println!();

    let stdin = io::stdin();
    let answers = ask(&mut Prompter::new(stdin.lock()), &current)?;

    let saved = save_answers(path, &answers)?;
    println!();
    println!("Configuration saved to {}.", path.display());
    Ok(saved)
}

/// Walk through every prompt, defaulting to the values in `current`.
pub fn ask<R: BufRead>(prompter: &mut Prompter<R>, current: &Configuration) -> Result<Answers> {
    Ok(Answers {
        panel_url: prompter.required("Panel URL", &current.panel_url)?,
        client_id: prompter.required("Client ID", &current.client_id)?,
        client_secret: prompter.secret("Client secret", &current.client_secret)?,
        variable_name: prompter.required("Variable name", &current.variable_name)?,
        target_url: prompter.required("Login page URL", &current.target_url)?,
        auto_sync: prompter.yes_no("Enable automatic sync", current.auto_sync)?,
        sync_interval_minutes: prompter
            .interval("Sync interval (minutes)", current.sync_interval_minutes)?,
        allow_implicit_create: prompter.yes_no(
            "Create the variable when it does not exist",
            current.allow_implicit_create,
        )?,
    })
}

/// Validate, then re-read the file and merge so fields written by the daemon
/// since the prompts started are preserved.
pub fn save_answers(path: &Path, answers: &Answers) -> Result<Configuration> {
    let mut candidate = config::load_or_default(path)?;
    answers.apply_to(&mut candidate);
    candidate.validate().map_err(describe)?;

    config::save(path, &candidate).with_context(|| format!("save {}", path.display()))?;
    Ok(candidate)
}

fn describe(err: ConfigError) -> anyhow::Error {
    anyhow::anyhow!("configuration not saved: {err}")
}

/// Line-oriented prompts over any reader; closed input is an error.
pub struct Prompter<R> {
    input: R,
}

impl<R: BufRead> Prompter<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    fn required(&mut self, label: &str, current: &str) -> Result<String> {
        self.prompt_internal(label, current, current, true)
    }

    fn secret(&mut self, label: &str, current: &str) -> Result<String> {
        let shown = if current.is_empty() {
            String::new()
        } else {
            mask_secret(current)
        };
        self.prompt_internal(label, &shown, current, true)
    }

    fn yes_no(&mut self, label: &str, current: bool) -> Result<bool> {
        let shown = if current { "Y/n" } else { "y/N" };
        loop {
            let answer = self.prompt_internal(label, shown, "", false)?;
            match parse_yes_no(&answer) {
                Some(value) => return Ok(value),
                None if answer.is_empty() => return Ok(current),
                None => println!("Please answer y or n."),
            }
        }
    }

    fn interval(&mut self, label: &str, current: i64) -> Result<i64> {
        let current = current.to_string();
        loop {
            let answer = self.prompt_internal(label, &current, &current, true)?;
            match answer.parse::<i64>() {
                Ok(minutes) if (1..=MAX_SYNC_INTERVAL_MINUTES).contains(&minutes) => {
                    return Ok(minutes)
                }
                _ => println!(
                    "Enter a whole number of minutes between 1 and {MAX_SYNC_INTERVAL_MINUTES}."
                ),
            }
        }
    }

    fn prompt_internal(
        &mut self,
        label: &str,
        shown: &str,
        current: &str,
        required: bool,
    ) -> Result<String> {
        let rendered = if shown.is_empty() {
            label.to_string()
        } else {
            format!("{label} [{shown}]")
        };

        loop {
            print!("{rendered}: ");
            io::stdout().flush().ok();
            let mut input = String::new();
            if self.input.read_line(&mut input)? == 0 {
                println!();
                bail!("input closed before configuration was complete");
            }
            let trimmed = input.trim().to_string();
            if trimmed.is_empty() {
                if required && current.trim().is_empty() {
                    println!("Value is required.");
                    continue;
                }
                return Ok(current.to_string());
            }
            return Ok(trimmed);
        }
    }
}

fn parse_yes_no(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" | "on" => Some(true),
        "n" | "no" | "false" | "off" => Some(false),
        _ => None,
    }
}
