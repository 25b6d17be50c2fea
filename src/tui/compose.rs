/// External editor: hand the terminal to `$EDITOR` and read the text back.
use std::io;
use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result, bail};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tempfile::NamedTempFile;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorOutcome {
    /// Trimmed, non-empty text.
    Composed(String),
    /// The file came back empty or whitespace-only.
    Cancelled,
    Failed(String),
}

pub type Term = Terminal<CrosstermBackend<io::Stdout>>;

// ── Terminal suspension ───────────────────────────────────────────────────────

/// Leaves raw mode and the alternate screen for as long as it lives.
/// Dropping it puts the terminal back and forces a full redraw, whatever
/// happened in between.
pub struct TerminalSuspension<'a> {
    terminal: &'a mut Term,
}

impl<'a> TerminalSuspension<'a> {
    pub fn suspend(terminal: &'a mut Term) -> Result<Self> {
        disable_raw_mode().context("Failed to leave raw mode")?;
        if let Err(e) = execute!(terminal.backend_mut(), LeaveAlternateScreen) {
            let _ = enable_raw_mode();
            return Err(e).context("Failed to leave alternate screen");
        }
        let _ = terminal.show_cursor();
        Ok(Self { terminal })
    }
}

impl Drop for TerminalSuspension<'_> {
    fn drop(&mut self) {
        if let Err(e) = enable_raw_mode() {
            warn!("could not re-enter raw mode: {e}");
        }
        if let Err(e) = execute!(self.terminal.backend_mut(), EnterAlternateScreen) {
            warn!("could not re-enter alternate screen: {e}");
        }
        let _ = self.terminal.clear();
    }
}

// ── Scratch file + subprocess ─────────────────────────────────────────────────

fn scratch_file(initial: &str) -> Result<NamedTempFile> {
    let file = tempfile::Builder::new()
        .prefix("chatterm-compose-")
        .suffix(".txt")
        .tempfile()
        .context("Failed to create scratch file")?;
    std::fs::write(file.path(), initial).context("Failed to write scratch file")?;
    Ok(file)
}

/// Trimmed file contents; whitespace-only means the user backed out.
fn read_back(path: &Path) -> Result<EditorOutcome> {
    let text = std::fs::read_to_string(path).context("Failed to read scratch file")?;
    let text = text.trim();
    if text.is_empty() {
        Ok(EditorOutcome::Cancelled)
    } else {
        Ok(EditorOutcome::Composed(text.to_string()))
    }
}

async fn edit(program: &str, args: &[String], initial: &str) -> Result<EditorOutcome> {
    // Removed when dropped, on every path out of here
    let scratch = scratch_file(initial)?;

    info!("launching editor {program}");
    let status = tokio::process::Command::new(program)
        .args(args)
        .arg(scratch.path())
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .with_context(|| format!("Failed to launch {program}"))?;
    if !status.success() {
        bail!("{program} exited with {status}");
    }
    read_back(scratch.path())
}

/// Run the editor on a scratch file seeded with `initial`. Never fails:
/// problems come back as [`EditorOutcome::Failed`].
pub async fn run_editor(program: &str, args: &[String], initial: &str) -> EditorOutcome {
    match edit(program, args, initial).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("editor: {e:#}");
            EditorOutcome::Failed(format!("{e:#}"))
        }
    }
}

/// [`run_editor`] with the TUI suspended around it.
pub async fn compose_in_terminal(
    terminal: &mut Term,
    program: &str,
    args: &[String],
    initial: &str,
) -> EditorOutcome {
    let guard = match TerminalSuspension::suspend(terminal) {
        Ok(g) => g,
        Err(e) => return EditorOutcome::Failed(format!("{e:#}")),
    };
    let outcome = run_editor(program, args, initial).await;
    drop(guard);
    outcome
}
