//! RFC 959 reply values and their wire serialization
//!
//! A reply is a numeric code plus text. Text containing `\n` is rendered
//! in the multi-line format: the first line carries `<code>-`, middle
//! lines are indented with a single space and the last line carries
//! `<code> ` so clients can find the end of the block.

/// A control-channel reply.
///
/// Immutable once built. A reply can chain a follow-up reply via `next`,
/// which the control connection writes immediately after it (used for the
/// `426` + `226` pair after an aborted transfer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    code: u16,
    text: String,
    noop: bool,
    next: Option<Box<Reply>>,
}

impl Reply {
    /// Create a reply with a code and text
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
            noop: false,
            next: None,
        }
    }

    /// A reply that is consumed by the reply loop but never written.
    ///
    /// Used by ABOR when a data connection is live: the user-visible
    /// replies are produced later by the transfer-outcome command.
    pub fn none() -> Self {
        Self {
            code: 0,
            text: String::new(),
            noop: true,
            next: None,
        }
    }

    /// Chain a follow-up reply written right after this one
    pub fn with_next(mut self, next: Reply) -> Self {
        self.next = Some(Box::new(next));
        self
    }

    /// The numeric reply code
    pub fn code(&self) -> u16 {
        self.code
    }

    /// The reply text (may contain `\n` for multi-line replies)
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether this reply is suppressed from the wire
    pub fn is_noop(&self) -> bool {
        self.noop
    }

    /// The chained follow-up reply, if any
    pub fn next(&self) -> Option<&Reply> {
        self.next.as_deref()
    }

    /// Whether this is a preliminary (1xx) reply
    pub fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }

    /// Serialize this reply (without its chain) per RFC 959.
    pub fn serialize(&self) -> String {
        if self.text.is_empty() {
            return format!("{}\r\n", self.code);
        }

        let lines: Vec<&str> = self.text.split('\n').map(str::trim).collect();
        if lines.len() == 1 {
            return format!("{} {}\r\n", self.code, lines[0]);
        }

        let mut out = String::new();
        let last = lines.len() - 1;
        for (i, line) in lines.iter().enumerate() {
            if i == 0 {
                out.push_str(&format!("{}-{}\r\n", self.code, line));
            } else if i == last {
                out.push_str(&format!("{} {}\r\n", self.code, line));
            } else {
                out.push_str(&format!(" {}\r\n", line));
            }
        }
        out
    }

    /// Serialize this reply followed by its whole `next` chain.
    pub fn serialize_chain(&self) -> String {
        let mut out = self.serialize();
        let mut cursor = self.next();
        while let Some(reply) = cursor {
            out.push_str(&reply.serialize());
            cursor = reply.next();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Parse a serialized reply back into (code, joined text). Only used
    /// to check the serialization round-trip.
    fn parse(wire: &str) -> (u16, String) {
        let mut code = 0u16;
        let mut lines = Vec::new();
        for raw in wire.split("\r\n").filter(|l| !l.is_empty()) {
            if let Some(rest) = raw.strip_prefix(' ') {
                lines.push(rest.trim().to_string());
                continue;
            }
            code = raw[..3].parse().unwrap();
            let rest = &raw[3..];
            let rest = rest.strip_prefix(['-', ' ']).unwrap_or(rest);
            if !rest.is_empty() || wire.split("\r\n").count() > 2 {
                lines.push(rest.trim().to_string());
            }
        }
        (code, lines.join("\n"))
    }

    #[test]
    fn test_serialize_empty_text() {
        assert_eq!(Reply::new(200, "").serialize(), "200\r\n");
    }

    #[test]
    fn test_serialize_single_line() {
        let reply = Reply::new(220, "skiff FTP server ready.");
        assert_eq!(reply.serialize(), "220 skiff FTP server ready.\r\n");
    }

    #[test]
    fn test_serialize_two_lines() {
        let reply = Reply::new(211, "Features:\nEnd");
        assert_eq!(reply.serialize(), "211-Features:\r\n211 End\r\n");
    }

    #[test]
    fn test_serialize_multi_line_indents_middle() {
        let reply = Reply::new(211, "Features:\nMDTM\nSIZE\nEnd");
        assert_eq!(
            reply.serialize(),
            "211-Features:\r\n MDTM\r\n SIZE\r\n211 End\r\n"
        );
    }

    #[test]
    fn test_serialize_trims_lines() {
        let reply = Reply::new(212, "Status:\n  entry  \nEnd");
        assert_eq!(reply.serialize(), "212-Status:\r\n entry\r\n212 End\r\n");
    }

    #[test]
    fn test_chain_serialization_order() {
        let reply = Reply::new(426, "Connection closed, transfer aborted.")
            .with_next(Reply::new(226, "Abort command successful."));
        assert_eq!(
            reply.serialize_chain(),
            "426 Connection closed, transfer aborted.\r\n226 Abort command successful.\r\n"
        );
    }

    #[test]
    fn test_noop_reply_is_marked() {
        assert!(Reply::none().is_noop());
        assert!(!Reply::new(200, "ok").is_noop());
    }

    #[test]
    fn test_preliminary_detection() {
        assert!(Reply::new(150, "Opening").is_preliminary());
        assert!(!Reply::new(226, "Done").is_preliminary());
        assert!(!Reply::new(99, "?").is_preliminary());
    }

    #[test]
    fn test_round_trip_single_line() {
        let reply = Reply::new(257, "\"/\" is current directory.");
        let (code, text) = parse(&reply.serialize());
        assert_eq!(code, 257);
        assert_eq!(text, "\"/\" is current directory.");
    }

    #[test]
    fn test_round_trip_multi_line() {
        let reply = Reply::new(211, "Features:\nMDTM\nREST STREAM\nEnd");
        let (code, text) = parse(&reply.serialize());
        assert_eq!(code, 211);
        assert_eq!(text, "Features:\nMDTM\nREST STREAM\nEnd");
    }
}
