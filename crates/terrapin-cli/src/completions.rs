//! Shell completion generation for the Terrapin CLI.
//!
//! Provides the `terrapin completions` subcommand to generate shell completion
//! scripts for bash, zsh, fish, and PowerShell.

use clap::{CommandFactory, Parser, ValueEnum};
use clap_complete::{Shell, generate};
use std::io;

/// Arguments for the completions subcommand.
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// The shell to generate completions for
    #[arg(value_enum)]
    pub shell: ShellArg,

    /// Override the binary name used in the completion script
    #[arg(long, default_value = "terrapin")]
    pub name: String,
}

/// Shell options for completion generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ShellArg {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

impl From<ShellArg> for Shell {
    fn from(arg: ShellArg) -> Self {
        match arg {
            ShellArg::Bash => Shell::Bash,
            ShellArg::Zsh => Shell::Zsh,
            ShellArg::Fish => Shell::Fish,
            ShellArg::PowerShell => Shell::PowerShell,
        }
    }
}

/// Writes the completion script for `args.shell` to `out`.
pub fn write_completions(args: &CompletionsArgs, out: &mut dyn io::Write) {
    let shell: Shell = args.shell.into();
    let mut cmd = crate::Cli::command();
    generate(shell, &mut cmd, args.name.clone(), out);
}
