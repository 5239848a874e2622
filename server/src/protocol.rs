//! Line-oriented wire protocol shared by the server and its clients.
//!
//! Every message is one UTF-8 line terminated by `\n`. The only reserved
//! server line is the roster, recognised by [`ROSTER_PREFIX`]; the only
//! reserved client line is [`EXIT_COMMAND`].

/// Sent once to a fresh connection; the next line it sends is its name.
pub const NAME_PROMPT: &str = "Enter your name: ";

/// Prefix of the participant roster control line.
pub const ROSTER_PREFIX: &str = "PARTICIPANTS:";

/// Client line announcing a graceful departure.
pub const EXIT_COMMAND: &str = "exit";

/// Operator console command that stops the server (case-insensitive).
pub const SHUTDOWN_COMMAND: &str = "done";

/// Status line a client shows once its socket is open.
pub const CONNECTED_STATUS: &str = "Connected to server.";

/// Status line a client shows once its socket has closed.
pub const DISCONNECTED_STATUS: &str = "Disconnected from server.";

pub fn joined(name: &str) -> String {
    format!("{name} has joined the chat.")
}

pub fn left(name: &str) -> String {
    format!("{name} has left the chat.")
}

pub fn chat(name: &str, text: &str) -> String {
    format!("{name}: {text}")
}

/// Builds the roster line. The prefix is present even when `names` is empty.
pub fn roster<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    let mut line = String::from(ROSTER_PREFIX);
    for name in names {
        line.push(' ');
        line.push_str(name);
    }
    line
}

/// Splits a roster line back into names, or `None` if `line` is not a roster.
pub fn parse_roster(line: &str) -> Option<Vec<String>> {
    let names = line.strip_prefix(ROSTER_PREFIX)?;
    Some(names.split_whitespace().map(str::to_string).collect())
}

/// Cleans up a handshake name line.
///
/// Surrounding whitespace is dropped and inner whitespace becomes `_`, so a
/// name always stays a single token inside the roster line. Returns `None`
/// when nothing is left.
pub fn normalize_name(raw: &str) -> Option<String> {
    let name = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");

    if name.is_empty() { None } else { Some(name) }
}

pub fn is_shutdown_command(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case(SHUTDOWN_COMMAND)
}
