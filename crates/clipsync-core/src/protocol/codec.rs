//! Line codec for encoding and decoding ClipSync protocol messages.
//!
//! Wire format:
//! ```text
//! {"type":"clipboard","contentType":"text/plain","content":"...","timestamp":0}\n
//! ```
//! One JSON object per line.  `serde_json` escapes control characters inside
//! strings, so a serialized message never contains a raw `\n` and the newline
//! can safely be used as the frame delimiter.  Text is carried verbatim
//! (non-ASCII characters stay UTF-8); images are carried as standard base64 of
//! the PNG bytes.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use tracing::debug;

use crate::protocol::messages::{
    current_timestamp_ms, ClipboardContent, ClipboardUpdate, ContentType, DiscoveryMessage,
    MessageKind, WireMessage, MAX_LINE_BYTES,
};

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The line is not valid JSON or does not match the message schema.
    #[error("malformed line: {0}")]
    MalformedLine(String),

    /// An `image/png` message carried content that is not valid base64.
    #[error("invalid base64 image payload: {0}")]
    InvalidBase64(String),

    /// The message could not be serialized.
    #[error("failed to serialize message: {0}")]
    Serialize(String),

    /// A peer sent more than the allowed number of bytes without a newline.
    #[error("line exceeds {limit} bytes without a terminator")]
    LineTooLong { limit: usize },

    /// A discovery datagram could not be parsed.
    #[error("malformed discovery datagram: {0}")]
    MalformedDatagram(String),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`ClipboardUpdate`] into one `\n`-terminated JSON line.
///
/// # Errors
///
/// Returns [`ProtocolError::Serialize`] if serialization fails.
///
/// # Examples
///
/// ```rust
/// use clipsync_core::{decode_line, encode_update, ClipboardUpdate};
///
/// let line = encode_update(&ClipboardUpdate::text("hello")).unwrap();
/// assert_eq!(line.last(), Some(&b'\n'));
/// let msg = decode_line(&line).unwrap();
/// assert_eq!(msg.content, "hello");
/// ```
pub fn encode_update(update: &ClipboardUpdate) -> Result<Vec<u8>, ProtocolError> {
    encode_message(&update_to_message(update))
}

/// Serializes an arbitrary [`WireMessage`] into one `\n`-terminated line.
///
/// # Errors
///
/// Returns [`ProtocolError::Serialize`] if serialization fails.
pub fn encode_message(msg: &WireMessage) -> Result<Vec<u8>, ProtocolError> {
    let mut line =
        serde_json::to_vec(msg).map_err(|e| ProtocolError::Serialize(e.to_string()))?;
    line.push(b'\n');
    Ok(line)
}

/// Decodes one line (with or without its trailing `\n`) into a [`WireMessage`].
///
/// Unknown `type` and `contentType` values decode successfully; only invalid
/// JSON or missing fields are errors.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedLine`] if the line cannot be parsed.
pub fn decode_line(line: &[u8]) -> Result<WireMessage, ProtocolError> {
    serde_json::from_slice(line).map_err(|e| ProtocolError::MalformedLine(e.to_string()))
}

/// Builds the wire envelope for an update.
pub fn update_to_message(update: &ClipboardUpdate) -> WireMessage {
    let (content_type, content) = match update.content() {
        ClipboardContent::Text(text) => (ContentType::TextPlain, text.clone()),
        ClipboardContent::Image(png) => (ContentType::ImagePng, STANDARD.encode(png)),
    };
    WireMessage {
        kind: MessageKind::Clipboard,
        content_type,
        content,
        timestamp: update.captured_at_ms(),
    }
}

/// Converts a decoded envelope back into a [`ClipboardUpdate`].
///
/// Returns `Ok(None)` for messages the relay does not act on (unknown `type`
/// or `contentType`).  A missing timestamp is replaced by the current time.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidBase64`] if an image payload cannot be decoded.
pub fn message_to_update(msg: WireMessage) -> Result<Option<ClipboardUpdate>, ProtocolError> {
    if let MessageKind::Unknown(kind) = &msg.kind {
        debug!("ignoring message of type {kind:?}");
        return Ok(None);
    }
    let captured_at_ms = if msg.timestamp > 0 {
        msg.timestamp
    } else {
        current_timestamp_ms()
    };
    let content = match msg.content_type {
        ContentType::TextPlain => ClipboardContent::Text(msg.content),
        ContentType::ImagePng => ClipboardContent::Image(decode_base64(&msg.content)?),
        ContentType::Unknown(mime) => {
            debug!("ignoring clipboard message with content type {mime:?}");
            return Ok(None);
        }
    };
    Ok(Some(ClipboardUpdate::at(content, captured_at_ms)))
}

/// Serializes a discovery datagram.
///
/// # Errors
///
/// Returns [`ProtocolError::Serialize`] if serialization fails.
pub fn encode_discovery(msg: &DiscoveryMessage) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(msg).map_err(|e| ProtocolError::Serialize(e.to_string()))
}

/// Parses a discovery datagram.  Unknown extra fields are ignored.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedDatagram`] if the datagram is not a
/// valid discovery message.
pub fn decode_discovery(datagram: &[u8]) -> Result<DiscoveryMessage, ProtocolError> {
    serde_json::from_slice(datagram).map_err(|e| ProtocolError::MalformedDatagram(e.to_string()))
}

/// Decodes standard base64, tolerating the line breaks some mobile encoders
/// insert every 76 characters.
fn decode_base64(content: &str) -> Result<Vec<u8>, ProtocolError> {
    let result = if content.bytes().any(|b| b.is_ascii_whitespace()) {
        let compact: String = content.split_ascii_whitespace().collect();
        STANDARD.decode(compact)
    } else {
        STANDARD.decode(content)
    };
    result.map_err(|e| ProtocolError::InvalidBase64(e.to_string()))
}

// ── Line framing ──────────────────────────────────────────────────────────────

/// Per-connection inbound buffer that turns a byte stream into lines.
///
/// Bytes are appended with [`push`](LineBuffer::push); every complete
/// `\n`-terminated line is returned (without the terminator and without a
/// trailing `\r`).  Blank lines are skipped.  Partial data stays buffered
/// until the rest arrives.
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    /// Prefix of `pending` already known to contain no `\n`.
    scanned: usize,
    max_line: usize,
}

impl LineBuffer {
    /// Creates a buffer with the default [`MAX_LINE_BYTES`] limit.
    pub fn new() -> Self {
        Self::with_limit(MAX_LINE_BYTES)
    }

    /// Creates a buffer that rejects pending lines longer than `max_line`.
    pub fn with_limit(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            scanned: 0,
            max_line,
        }
    }

    /// Appends `bytes` and returns every line completed by them.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::LineTooLong`] if the unterminated remainder
    /// exceeds the limit.  The buffer should be discarded afterwards.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<Vec<u8>>, ProtocolError> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut line_start = 0;
        let mut cursor = self.scanned;
        while let Some(offset) = self.pending[cursor..].iter().position(|&b| b == b'\n') {
            let end = cursor + offset;
            let line = strip_cr(&self.pending[line_start..end]);
            if !line.iter().all(u8::is_ascii_whitespace) {
                lines.push(line.to_vec());
            }
            line_start = end + 1;
            cursor = line_start;
        }

        self.pending.drain(..line_start);
        self.scanned = self.pending.len();

        if self.pending.len() > self.max_line {
            return Err(ProtocolError::LineTooLong {
                limit: self.max_line,
            });
        }
        Ok(lines)
    }

    /// Number of buffered bytes still waiting for a terminator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_update_produces_single_terminated_line() {
        // Arrange
        let update = ClipboardUpdate::text("line one\nline two\r\n\ttab");

        // Act
        let line = encode_update(&update).unwrap();

        // Assert – exactly one newline, and it is the last byte
        assert_eq!(line.iter().filter(|&&b| b == b'\n').count(), 1);
        assert_eq!(line.last(), Some(&b'\n'));
    }

    #[test]
    fn test_encode_update_keeps_non_ascii_text_as_utf8() {
        let line = encode_update(&ClipboardUpdate::text("剪贴板 ✓")).unwrap();
        let as_str = std::str::from_utf8(&line).unwrap();
        assert!(as_str.contains("剪贴板 ✓"));
    }

    #[test]
    fn test_encode_image_uses_standard_base64() {
        // Arrange
        let update = ClipboardUpdate::image(vec![0x89, b'P', b'N', b'G', 0xFF]);

        // Act
        let msg = decode_line(&encode_update(&update).unwrap()).unwrap();

        // Assert
        assert_eq!(msg.content_type, ContentType::ImagePng);
        assert_eq!(msg.content, "iVBOR/8=");
    }

    #[test]
    fn test_decode_line_rejects_non_json() {
        let result = decode_line(b"not-json");
        assert!(matches!(result, Err(ProtocolError::MalformedLine(_))));
    }

    #[test]
    fn test_decode_line_rejects_missing_content_field() {
        let result = decode_line(br#"{"type":"clipboard","contentType":"text/plain"}"#);
        assert!(matches!(result, Err(ProtocolError::MalformedLine(_))));
    }

    #[test]
    fn test_decode_line_accepts_unknown_tags_structurally() {
        // Arrange
        let line = br#"{"type":"presence","contentType":"text/html","content":"x","timestamp":3}"#;

        // Act
        let msg = decode_line(line).expect("unknown tags are not parse errors");

        // Assert
        assert_eq!(msg.kind, MessageKind::Unknown("presence".to_string()));
        assert_eq!(msg.content_type, ContentType::Unknown("text/html".to_string()));
    }

    #[test]
    fn test_message_to_update_ignores_unknown_type() {
        let msg = WireMessage {
            kind: MessageKind::Unknown("ping".to_string()),
            content_type: ContentType::TextPlain,
            content: "x".to_string(),
            timestamp: 1,
        };
        assert_eq!(message_to_update(msg), Ok(None));
    }

    #[test]
    fn test_message_to_update_ignores_unknown_content_type() {
        let msg = WireMessage {
            kind: MessageKind::Clipboard,
            content_type: ContentType::Unknown("text/html".to_string()),
            content: "<b>x</b>".to_string(),
            timestamp: 1,
        };
        assert_eq!(message_to_update(msg), Ok(None));
    }

    #[test]
    fn test_message_to_update_rejects_bad_base64() {
        let msg = WireMessage {
            kind: MessageKind::Clipboard,
            content_type: ContentType::ImagePng,
            content: "***not base64***".to_string(),
            timestamp: 1,
        };
        assert!(matches!(
            message_to_update(msg),
            Err(ProtocolError::InvalidBase64(_))
        ));
    }

    #[test]
    fn test_message_to_update_accepts_wrapped_base64() {
        // Arrange – Android's Base64.DEFAULT wraps output with newlines
        let msg = WireMessage {
            kind: MessageKind::Clipboard,
            content_type: ContentType::ImagePng,
            content: "iVBO\nR/8=\n".to_string(),
            timestamp: 1,
        };

        // Act
        let update = message_to_update(msg).unwrap().unwrap();

        // Assert
        assert_eq!(
            update.content(),
            &ClipboardContent::Image(vec![0x89, b'P', b'N', b'G', 0xFF])
        );
    }

    #[test]
    fn test_message_to_update_substitutes_missing_timestamp() {
        let msg = decode_line(br#"{"type":"clipboard","contentType":"text/plain","content":"w"}"#)
            .unwrap();
        let update = message_to_update(msg).unwrap().unwrap();
        assert!(update.captured_at_ms() > 0);
    }

    #[test]
    fn test_discovery_datagram_round_trip() {
        // Arrange
        let msg = DiscoveryMessage {
            device_type: "windows".to_string(),
            device_name: "desk".to_string(),
            ip_address: "192.168.1.20".to_string(),
            port: 5152,
            timestamp: 99,
        };

        // Act
        let decoded = decode_discovery(&encode_discovery(&msg).unwrap()).unwrap();

        // Assert
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_decode_discovery_rejects_garbage() {
        assert!(matches!(
            decode_discovery(b"\x00\x01"),
            Err(ProtocolError::MalformedDatagram(_))
        ));
    }

    // ── LineBuffer ────────────────────────────────────────────────────────────

    #[test]
    fn test_line_buffer_holds_partial_line_until_terminated() {
        // Arrange
        let mut buf = LineBuffer::new();

        // Act
        let first = buf.push(b"{\"a\":").unwrap();
        let second = buf.push(b"1}\n").unwrap();

        // Assert
        assert!(first.is_empty());
        assert_eq!(second, vec![b"{\"a\":1}".to_vec()]);
        assert_eq!(buf.pending_len(), 0);
    }

    #[test]
    fn test_line_buffer_splits_multiple_lines_in_one_chunk() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(b"one\ntwo\r\nthr").unwrap();
        assert_eq!(lines, vec![b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(buf.pending_len(), 3);

        let rest = buf.push(b"ee\n").unwrap();
        assert_eq!(rest, vec![b"three".to_vec()]);
    }

    #[test]
    fn test_line_buffer_skips_blank_lines() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(b"\n  \r\nx\n").unwrap();
        assert_eq!(lines, vec![b"x".to_vec()]);
    }

    #[test]
    fn test_line_buffer_rejects_oversized_pending_line() {
        // Arrange
        let mut buf = LineBuffer::with_limit(8);

        // Act
        let result = buf.push(b"0123456789");

        // Assert
        assert_eq!(result, Err(ProtocolError::LineTooLong { limit: 8 }));
    }

    #[test]
    fn test_line_buffer_limit_applies_only_to_unterminated_remainder() {
        let mut buf = LineBuffer::with_limit(8);
        let lines = buf.push(b"0123456789abcdef\nxy").unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(buf.pending_len(), 2);
    }
}
