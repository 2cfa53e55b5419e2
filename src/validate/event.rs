//! Delivery log line parsing.
//!
//! Lines are whitespace-separated: `b <seq>` for a broadcast and
//! `d <sender> <seq>` for a delivery. Other leading tokens are ignored.

use crate::participant::ParticipantId;

/// Sequence number a sender assigns to its own broadcasts, starting at 1.
pub type Seq = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryLogEvent {
    Broadcast { seq: Seq },
    Deliver { sender: ParticipantId, seq: Seq },
}

/// What one log line turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineParse {
    Event(DeliveryLogEvent),
    /// Blank line or unrecognized leading token.
    Ignored,
    /// A `b`/`d` line with missing or non-numeric fields.
    Malformed(String),
}

/// One line of a delivery log with its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry<'a> {
    pub line: usize,
    pub text: &'a str,
    pub parsed: LineParse,
}

pub fn parse_line(line: &str) -> LineParse {
    let mut tokens = line.split_whitespace();
    match tokens.next() {
        Some("b") => match field::<Seq>(tokens.next(), "sequence number") {
            Ok(seq) => LineParse::Event(DeliveryLogEvent::Broadcast { seq }),
            Err(reason) => LineParse::Malformed(reason),
        },
        Some("d") => {
            let sender = field::<u32>(tokens.next(), "sender id");
            let seq = field::<Seq>(tokens.next(), "sequence number");
            match (sender, seq) {
                (Ok(sender), Ok(seq)) => LineParse::Event(DeliveryLogEvent::Deliver {
                    sender: ParticipantId(sender),
                    seq,
                }),
                (Err(reason), _) | (_, Err(reason)) => LineParse::Malformed(reason),
            }
        }
        _ => LineParse::Ignored,
    }
}

fn field<T: std::str::FromStr>(token: Option<&str>, what: &str) -> Result<T, String> {
    let token = token.ok_or_else(|| format!("missing {}", what))?;
    token
        .parse()
        .map_err(|_| format!("invalid {} `{}`", what, token))
}

/// Parse every line of a log, skipping nothing but keeping line numbers.
pub fn parse_log(contents: &str) -> impl Iterator<Item = LogEntry<'_>> {
    contents.lines().enumerate().map(|(index, text)| LogEntry {
        line: index + 1,
        text,
        parsed: parse_line(text),
    })
}
