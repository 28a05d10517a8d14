//! Server-sent event framing.
//!
//! A [`Frame`] is one self-delimited unit of a `text/event-stream` body:
//! zero or more `field: value` lines followed by a blank line. Payload
//! lines are split on `\r\n`, `\r` and `\n` so a rendered value can never
//! break out of its frame.

use std::fmt;

/// One encoded server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(String);

impl Frame {
    /// An unnamed event (delivered to `message` listeners) carrying
    /// `payload` in its `data` field.
    pub fn data(payload: &str) -> Self {
        let mut out = String::with_capacity(payload.len().saturating_add(8));
        push_data(&mut out, payload);
        out.push('\n');
        Self(out)
    }

    /// A comment frame. Clients ignore it; it keeps idle connections
    /// from timing out and surfaces dead ones on write.
    pub fn comment(text: &str) -> Self {
        Self(format!(": {}\n\n", single_line(text)))
    }

    /// The encoded frame.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the frame, returning the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0.into_bytes()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Frame> for String {
    fn from(frame: Frame) -> Self {
        frame.0
    }
}

fn push_data(out: &mut String, payload: &str) {
    for line in payload.split("\r\n").flat_map(|l| l.split(['\r', '\n'])) {
        out.push_str("data: ");
        out.push_str(line);
        out.push('\n');
    }
}

fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_payload() {
        assert_eq!(Frame::data("3").as_str(), "data: 3\n\n");
    }

    #[test]
    fn empty_payload_still_has_data_field() {
        assert_eq!(Frame::data("").as_str(), "data: \n\n");
    }

    #[test]
    fn multi_line_payload_is_split_into_data_lines() {
        let frame = Frame::data("<div>\r\n<h1>1</h1>\r</div>\n");
        assert_eq!(
            frame.as_str(),
            "data: <div>\ndata: <h1>1</h1>\ndata: </div>\ndata: \n\n"
        );
    }

    #[test]
    fn comment_cannot_span_lines() {
        assert_eq!(Frame::comment("keep\nalive").as_str(), ": keep alive\n\n");
    }

    #[test]
    fn into_bytes_matches_display() {
        let frame = Frame::data("x");
        let text = frame.to_string();
        assert_eq!(frame.into_bytes(), text.into_bytes());
    }
}
