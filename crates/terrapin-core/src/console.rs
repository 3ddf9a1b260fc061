//! Console output and user prompts.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, IsTerminal, Write};
use std::time::Duration;

/// Where command output goes and where approval answers come from.
///
/// Standard output carries progress and job logs, the error stream carries
/// failures.
pub trait Console {
    /// Writes text verbatim to standard output.
    fn write(&mut self, text: &str);

    /// Writes one line to standard output.
    fn print(&mut self, line: &str);

    /// Writes one error line to the error stream.
    fn error(&mut self, line: &str);

    /// Shows `question` and returns the answer without its line ending.
    fn prompt(&mut self, question: &str) -> io::Result<String>;

    /// Signals the start of a wait with no output of its own.
    fn begin_wait(&mut self, _message: &str) {}

    fn end_wait(&mut self) {}
}

/// Console backed by the process's standard streams.
#[derive(Debug)]
pub struct StdConsole {
    use_colors: bool,
    spinner: Option<ProgressBar>,
}

impl StdConsole {
    pub fn new(use_colors: bool) -> Self {
        Self {
            use_colors,
            spinner: None,
        }
    }
}

impl Console for StdConsole {
    fn write(&mut self, text: &str) {
        let mut out = io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    fn print(&mut self, line: &str) {
        println!("{line}");
    }

    fn error(&mut self, line: &str) {
        if self.use_colors {
            eprintln!("{} {}", "Error:".red().bold(), line);
        } else {
            eprintln!("Error: {line}");
        }
    }

    fn prompt(&mut self, question: &str) -> io::Result<String> {
        if self.use_colors {
            print!("{}", question.bold());
        } else {
            print!("{question}");
        }
        io::stdout().flush()?;

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(answer.trim_end_matches(['\r', '\n']).to_string())
    }

    fn begin_wait(&mut self, message: &str) {
        if !io::stdout().is_terminal() {
            println!("{message}");
            return;
        }
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(120));
        self.spinner = Some(spinner);
    }

    fn end_wait(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}
