use std::sync::Arc;

use crate::emulation::command_table::{CommandTable, COMMAND_NOT_FOUND};

pub const PROMPT: &str = "$ ";

/// Exit status reported for `exec` requests whose command is not in the table.
pub const EXIT_NOT_FOUND: u32 = 127;

/// Turns one chunk of channel data into a command line.
///
/// Exactly one trailing `\r\n`, `\n` or `\r` is removed. Everything else, spaces included, is
/// kept so that lookups stay exact.
pub fn chunk_to_line(chunk: &[u8]) -> String {
    let text = String::from_utf8_lossy(chunk);
    let line = text
        .strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .or_else(|| text.strip_suffix('\r'))
        .unwrap_or(&text);
    line.to_string()
}

/// Fake interactive shell answering from a [`CommandTable`].
#[derive(Debug, Clone)]
pub struct Shell {
    table: Arc<CommandTable>,
}

impl Shell {
    pub fn new(table: Arc<CommandTable>) -> Self {
        Self { table }
    }

    pub fn respond(&self, line: &str) -> &str {
        self.table.lookup(line).unwrap_or(COMMAND_NOT_FOUND)
    }

    pub fn exit_status(&self, line: &str) -> u32 {
        if self.table.contains(line) {
            0
        } else {
            EXIT_NOT_FOUND
        }
    }
}
