//! Console output - styled lines on the operator's terminal
//!
//! Both drains print through a shared [`Console`]; each line is written
//! under one lock so output from the two never interleaves mid-line.

use crossterm::{
    queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

/// What a line of output represents, used for styling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Informational text from the server
    Server,
    /// Confirmation of a subscription change
    Success,
    /// A message published to a channel
    ChannelMessage,
    /// A user joined
    Joined,
    /// A user left
    Left,
    /// Error reported by the server
    ServerError,
    /// Locally generated notice (usage, status, help)
    Notice,
    /// Locally detected error
    LocalError,
    /// Non-JSON payload printed as-is
    Raw,
    /// Pretty-printed JSON
    Structured,
    /// Heuristic annotation on structured output
    Annotation,
}

impl LineKind {
    fn color(self) -> Option<Color> {
        match self {
            LineKind::Server => Some(Color::Cyan),
            LineKind::Success => Some(Color::Green),
            LineKind::ChannelMessage => None,
            LineKind::Joined | LineKind::Left => Some(Color::Blue),
            LineKind::ServerError => Some(Color::Magenta),
            LineKind::Notice => Some(Color::Yellow),
            LineKind::LocalError => Some(Color::Red),
            LineKind::Raw | LineKind::Structured => None,
            LineKind::Annotation => Some(Color::DarkGreen),
        }
    }
}

/// A single rendered line of output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub kind: LineKind,
    pub text: String,
}

impl OutputLine {
    pub fn new(kind: LineKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn notice(text: impl Into<String>) -> Self {
        Self::new(LineKind::Notice, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(LineKind::LocalError, text)
    }
}

enum Target {
    Stdout,
    Capture(Vec<OutputLine>),
}

/// Cloneable handle to the terminal output surface
#[derive(Clone)]
pub struct Console {
    target: Arc<Mutex<Target>>,
    colors: bool,
}

impl Console {
    /// Console writing to stdout
    pub fn stdout(colors: bool) -> Self {
        Self {
            target: Arc::new(Mutex::new(Target::Stdout)),
            colors,
        }
    }

    /// Console that records lines in memory instead of printing them
    pub fn capture() -> Self {
        Self {
            target: Arc::new(Mutex::new(Target::Capture(Vec::new()))),
            colors: false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Target> {
        self.target.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Print one line
    pub fn line(&self, line: OutputLine) {
        let mut target = self.lock();
        match &mut *target {
            Target::Stdout => {
                if let Err(e) = write_styled(&line, self.colors, true) {
                    tracing::warn!("Failed to write to terminal: {}", e);
                }
            }
            Target::Capture(lines) => lines.push(line),
        }
    }

    /// Print several lines in order
    pub fn lines(&self, lines: impl IntoIterator<Item = OutputLine>) {
        for line in lines {
            self.line(line);
        }
    }

    pub fn notice(&self, text: impl Into<String>) {
        self.line(OutputLine::notice(text));
    }

    pub fn error(&self, text: impl Into<String>) {
        self.line(OutputLine::error(text));
    }

    /// Print a question without a trailing newline
    pub fn prompt(&self, text: &str) {
        let mut target = self.lock();
        match &mut *target {
            Target::Stdout => {
                let line = OutputLine::new(LineKind::Notice, text);
                if let Err(e) = write_styled(&line, false, false) {
                    tracing::warn!("Failed to write to terminal: {}", e);
                }
            }
            Target::Capture(lines) => lines.push(OutputLine::notice(text)),
        }
    }

    /// Lines recorded by a capturing console
    pub fn captured(&self) -> Vec<OutputLine> {
        match &*self.lock() {
            Target::Stdout => Vec::new(),
            Target::Capture(lines) => lines.clone(),
        }
    }

    /// Text of the lines recorded by a capturing console
    pub fn captured_text(&self) -> Vec<String> {
        self.captured().into_iter().map(|l| l.text).collect()
    }
}

fn write_styled(line: &OutputLine, colors: bool, newline: bool) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    match line.kind.color().filter(|_| colors) {
        Some(color) => {
            queue!(
                stdout,
                SetForegroundColor(color),
                Print(&line.text),
                ResetColor
            )?;
        }
        None => queue!(stdout, Print(&line.text))?,
    }
    if newline {
        queue!(stdout, Print("\n"))?;
    }
    stdout.flush()
}
