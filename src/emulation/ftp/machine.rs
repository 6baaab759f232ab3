use std::net::SocketAddr;
use std::sync::Arc;

use uuid::Uuid;

use crate::configuration::types::Protocol;
use crate::emulation::command_table::CommandTable;
use crate::session_management::{Session, SessionState};
use crate::storage::types::{Credential, EventDetail};

pub const REPLY_NEED_PASSWORD: &str = "331 Please specify the password.\r\n";
pub const REPLY_LOGGED_IN: &str = "230 Login successful.\r\n";
pub const REPLY_NOT_LOGGED_IN: &str = "530 Please login with USER and PASS.\r\n";
pub const REPLY_BAD_ARGUMENTS: &str = "501 Syntax error in parameters or arguments.\r\n";
pub const REPLY_BAD_SEQUENCE: &str = "503 Login with USER first.\r\n";
pub const REPLY_SYNTAX_ERROR: &str = "500 Syntax error, command unrecognized.\r\n";
pub const REPLY_GOODBYE: &str = "221 Goodbye.\r\n";
pub const REPLY_NOT_IMPLEMENTED: &str = "502 Command not implemented.\r\n";
pub const REPLY_LINE_TOO_LONG: &str = "500 Line too long.\r\n";
pub const REPLY_TIMEOUT: &str = "421 Timeout.\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FtpState {
    Greeting,
    AwaitingUser,
    AwaitingPassword { username: String },
    Authenticated { username: String },
    Closed,
}

impl SessionState for FtpState {
    fn label(&self) -> &'static str {
        match self {
            FtpState::Greeting => "greeting",
            FtpState::AwaitingUser => "awaiting_user",
            FtpState::AwaitingPassword { .. } => "awaiting_password",
            FtpState::Authenticated { .. } => "authenticated",
            FtpState::Closed => "closed",
        }
    }

    fn is_closed(&self) -> bool {
        matches!(self, FtpState::Closed)
    }
}

/// One parsed control line: an upper-cased verb and its optional argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpCommand {
    pub verb: String,
    pub arg: Option<String>,
}

impl FtpCommand {
    /// Parses `VERB [ARG]`, where the verb is 3 or 4 ASCII letters in any case.
    ///
    /// The terminator must already be stripped. Returns `None` for anything else, including the
    /// empty line.
    pub fn parse(line: &str) -> Option<Self> {
        let (verb, arg) = match line.split_once(' ') {
            Some((verb, arg)) => (verb, Some(arg)),
            None => (line, None),
        };

        if !(3..=4).contains(&verb.len()) || !verb.bytes().all(|b| b.is_ascii_alphabetic()) {
            return None;
        }

        Some(Self {
            verb: verb.to_ascii_uppercase(),
            arg: arg.filter(|a| !a.is_empty()).map(str::to_string),
        })
    }
}

/// What to do after one control line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpStep {
    pub reply: String,
    pub event: EventDetail,
}

/// FTP control-channel state machine, free of any IO.
pub struct FtpMachine {
    session: Session<FtpState>,
    banner: String,
    table: Arc<CommandTable>,
}

impl FtpMachine {
    pub fn new(
        client_addr: SocketAddr,
        banner: impl Into<String>,
        table: Arc<CommandTable>,
        history_limit: usize,
    ) -> Self {
        Self {
            session: Session::new(Protocol::Ftp, client_addr, FtpState::Greeting, history_limit),
            banner: banner.into(),
            table,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session.id
    }

    pub fn state(&self) -> &FtpState {
        self.session.state()
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    /// Welcome reply written on connect.
    pub fn greet(&mut self) -> String {
        if matches!(self.session.state(), FtpState::Greeting) {
            self.session.transition(FtpState::AwaitingUser);
        }
        format!("{}\r\n", self.banner)
    }

    /// Handles one control line whose terminator has been stripped.
    pub fn on_line(&mut self, line: &str) -> FtpStep {
        let Some(command) = FtpCommand::parse(line) else {
            return FtpStep {
                reply: REPLY_SYNTAX_ERROR.to_string(),
                event: EventDetail::protocol_error(format!("unrecognized command line {:?}", line)),
            };
        };
        self.session.record(line);

        if command.verb == "QUIT" {
            self.session.transition(FtpState::Closed);
            return Self::reply(REPLY_GOODBYE, EventDetail::command(line));
        }

        let state = self.session.state().clone();
        match state {
            FtpState::Greeting | FtpState::AwaitingUser => match (command.verb.as_str(), command.arg) {
                ("USER", Some(username)) => {
                    self.session
                        .transition(FtpState::AwaitingPassword { username });
                    Self::reply(REPLY_NEED_PASSWORD, EventDetail::command(line))
                }
                ("USER", None) => Self::reply(REPLY_BAD_ARGUMENTS, EventDetail::command(line)),
                _ => Self::reply(REPLY_NOT_LOGGED_IN, EventDetail::command(line)),
            },
            FtpState::AwaitingPassword { username } => {
                if command.verb != "PASS" {
                    return Self::reply(REPLY_BAD_SEQUENCE, EventDetail::command(line));
                }
                let password = command.arg.unwrap_or_default();
                self.session.transition(FtpState::Authenticated {
                    username: username.clone(),
                });
                Self::reply(
                    REPLY_LOGGED_IN,
                    EventDetail::AuthAttempt {
                        username,
                        credential: Credential::Password(password),
                    },
                )
            }
            FtpState::Authenticated { .. } => {
                let reply = self
                    .table
                    .lookup(&command.verb)
                    .unwrap_or(REPLY_NOT_IMPLEMENTED);
                Self::reply(reply, EventDetail::command(line))
            }
            FtpState::Closed => Self::reply(REPLY_GOODBYE, EventDetail::command(line)),
        }
    }

    /// Moves to `Closed` and returns the `disconnect` payload.
    pub fn finish(&mut self) -> EventDetail {
        self.session.transition(FtpState::Closed);
        EventDetail::Disconnect {
            duration_ms: self.session.elapsed_ms(),
            commands: self.session.history().to_vec(),
        }
    }

    fn reply(reply: &str, event: EventDetail) -> FtpStep {
        FtpStep {
            reply: reply.to_string(),
            event,
        }
    }
}
