//! Command results reported by the server or synthesized by the client.

use std::fmt;

/// Outcome of a remote call.
///
/// Values in [-2, 3] are reported by the server in `REPLY_FAIL` frames;
/// `LinkFailure` is also synthesized locally for any I/O, framing, or
/// parsing error and for operations attempted on a broken link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum CommandResult {
    /// The link failed or the reply could not be decoded.
    LinkFailure = -3,
    /// The command needs an interactive console.
    NeedsConsole = -2,
    /// The command is not implemented by the server.
    NotImplemented = -1,
    /// Success; the output message is populated.
    Ok = 0,
    /// The command failed.
    Failure = 1,
    /// The command was invoked incorrectly.
    WrongUsage = 2,
    /// The command was not found.
    NotFound = 3,
}

impl CommandResult {
    /// Converts a raw protocol value, if it is in range.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            -3 => Some(Self::LinkFailure),
            -2 => Some(Self::NeedsConsole),
            -1 => Some(Self::NotImplemented),
            0 => Some(Self::Ok),
            1 => Some(Self::Failure),
            2 => Some(Self::WrongUsage),
            3 => Some(Self::NotFound),
            _ => None,
        }
    }

    /// Interprets the size field of a `REPLY_FAIL` header.
    ///
    /// Values outside [-3, 3] map to `LinkFailure`.
    pub fn from_reply_fail(size: i32) -> Self {
        Self::from_raw(size).unwrap_or(Self::LinkFailure)
    }

    /// Returns the raw protocol value.
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    /// Returns true for [`CommandResult::Ok`].
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LinkFailure => "link failure",
            Self::NeedsConsole => "needs console",
            Self::NotImplemented => "not implemented",
            Self::Ok => "ok",
            Self::Failure => "failure",
            Self::WrongUsage => "wrong usage",
            Self::NotFound => "not found",
        };
        f.write_str(name)
    }
}
