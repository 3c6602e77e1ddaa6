//! Input handling - operator lines and their parsed shape

use crate::client::console::Console;
use tokio::sync::mpsc;

/// Parsed operator input, before the session mode gives it meaning
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedInput {
    /// Blank line
    Empty,

    /// Slash command: /command args
    Command { name: String, args: Vec<String> },

    /// Channel post: #channel message
    ChannelPost {
        channel: String,
        body: Option<String>,
    },

    /// Anything else
    Text(String),
}

/// Parse a line of operator input
pub fn parse_input(line: &str) -> ParsedInput {
    let line = line.trim();

    if line.is_empty() {
        return ParsedInput::Empty;
    }

    if let Some(rest) = line.strip_prefix('/') {
        let mut parts = rest.split_whitespace();
        let name = parts.next().unwrap_or_default().to_string();
        let args = parts.map(String::from).collect();
        return ParsedInput::Command { name, args };
    }

    if let Some(rest) = line.strip_prefix('#') {
        return match rest.split_once(char::is_whitespace) {
            Some((channel, body)) => ParsedInput::ChannelPost {
                channel: channel.to_string(),
                body: Some(body.to_string()),
            },
            None => ParsedInput::ChannelPost {
                channel: rest.to_string(),
                body: None,
            },
        };
    }

    ParsedInput::Text(line.to_string())
}

/// Source of operator lines
///
/// Lines arrive over a channel so the async side never blocks on the
/// terminal; `None` means end of input.
pub struct LineInput {
    rx: mpsc::Receiver<String>,
}

impl LineInput {
    /// Read lines from stdin on a dedicated thread
    pub fn stdin() -> Self {
        let (tx, rx) = mpsc::channel(100);

        std::thread::spawn(move || {
            for line in std::io::stdin().lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Failed to read from stdin: {}", e);
                        break;
                    }
                }
            }
            tracing::debug!("Stdin reader finished");
        });

        Self { rx }
    }

    /// Create an input fed by the returned sender
    pub fn channel(capacity: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }

    /// Wait for the next line
    pub async fn next_line(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Ask a question and return the trimmed answer, or `default` if it is empty
    pub async fn prompt(&mut self, console: &Console, question: &str, default: &str) -> String {
        console.prompt(question);
        match self.next_line().await {
            Some(answer) if !answer.trim().is_empty() => answer.trim().to_string(),
            _ => default.to_string(),
        }
    }
}
