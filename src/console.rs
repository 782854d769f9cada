//! Operator commands read line by line from stdin.

use std::str::FromStr;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::AppState;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// List commands.
    Help,
    /// Validate the upstream token.
    Validate,
    /// Refresh and save the badge cache.
    Refresh,
}

const COMMANDS: &[(&str, Command)] = &[
    ("do", Command::Help),
    ("do validate", Command::Validate),
    ("do refresh", Command::Refresh),
];

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");

        COMMANDS
            .iter()
            .find(|(name, _)| *name == line)
            .map(|(_, command)| *command)
            .ok_or(line)
    }
}

impl Command {
    /// Run the command and describe its outcome.
    pub async fn execute(self, state: &AppState) -> Result<String> {
        match self {
            Command::Help => {
                let names = COMMANDS
                    .iter()
                    .map(|(name, _)| *name)
                    .filter(|name| name.starts_with("do "))
                    .collect::<Vec<_>>();
                Ok(format!("commands: {}", names.join(", ")))
            },
            Command::Validate => {
                if state.auth.validate().await? {
                    Ok("successfully validated auth token".into())
                } else {
                    Ok("failed to validate auth token".into())
                }
            },
            Command::Refresh => {
                state.badges.refresh().await?;
                state.badges.save().await?;
                Ok(format!("refreshed {} badge sets", state.badges.len()))
            },
        }
    }
}

/// Execute every line of `input` until it ends.
pub async fn run<R>(state: AppState, input: R)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                tracing::error!(error = %err, "cannot read console input");
                break;
            },
        };

        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<Command>() {
            Ok(command) => match command.execute(&state).await {
                Ok(outcome) => tracing::info!(?command, "{outcome}"),
                Err(err) => tracing::error!(?command, error = %err, "command failed"),
            },
            Err(line) => tracing::warn!(%line, "unknown command; type `do` for a list"),
        }
    }

    tracing::info!("console input closed");
}
