//! Line-prefix capability detection.
//!
//! This is deliberately not an FTP reply parser: there is no reply-code
//! grammar and no multi-line continuation handling. Each decoded line is
//! checked against two independent prefixes and that is all.

/// Prefix announcing explicit TLS upgrade support.
pub const TLS_MARKER: &str = "AUTH TLS";
/// Reply code prefix of a successful login.
pub const LOGIN_OK: &str = "230 ";

pub fn announces_tls(line: &str) -> bool {
    line.starts_with(TLS_MARKER)
}

pub fn login_accepted(line: &str) -> bool {
    line.starts_with(LOGIN_OK)
}

/// What one session learned about a server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub supports_tls: bool,
    pub allows_anonymous: bool,
    /// Every received line, each followed by `\n`. Empty when capture is off.
    pub transcript: String,
}

impl Capabilities {
    /// Fold one decoded line (without its terminator) into the result.
    pub fn observe(&mut self, line: &str, capture: bool) {
        if announces_tls(line) {
            self.supports_tls = true;
        }
        if login_accepted(line) {
            self.allows_anonymous = true;
        }
        if capture {
            self.transcript.push_str(line);
            self.transcript.push('\n');
        }
    }
}
