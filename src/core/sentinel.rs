//! Completion tokens and terminator-line parsing.
//!
//! After sourcing a step script the session echoes an empty line and then
//! `<token> <status>`. The per-step EXIT trap echoes `<token> <status> exit`
//! instead when the script calls `exit` and the shell goes away. The empty
//! line guarantees the terminator starts a line of its own, so only a line
//! that begins with the token can end a step. Anything else on the stream is
//! step output.

use uuid::Uuid;

/// Marker appended by the EXIT trap
pub const EXIT_MARKER: &str = "exit";

/// Per-step stream delimiter, fresh for every invocation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompletionToken(String);

impl CompletionToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// What a single output line turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scan {
    /// Ordinary step output
    Output(String),

    /// The step finished
    Terminator {
        status: i32,
        /// The shell is exiting along with the step
        session_exited: bool,
    },

    /// The token was present but the status could not be read
    Malformed(String),
}

/// Classify `line` against the current step's token
pub fn scan_line(line: &str, token: &CompletionToken) -> Scan {
    let token = token.as_str();

    if let Some(rest) = line.strip_prefix(token) {
        return match parse_status(rest) {
            Some((status, session_exited)) => Scan::Terminator {
                status,
                session_exited,
            },
            None => Scan::Malformed(line.to_string()),
        };
    }

    Scan::Output(line.to_string())
}

/// Parse ` <status>` or ` <status> exit`
fn parse_status(rest: &str) -> Option<(i32, bool)> {
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let mut fields = rest.split_whitespace();
    let status = fields.next()?.parse::<i32>().ok()?;
    match (fields.next(), fields.next()) {
        (None, _) => Some((status, false)),
        (Some(EXIT_MARKER), None) => Some((status, true)),
        _ => None,
    }
}
