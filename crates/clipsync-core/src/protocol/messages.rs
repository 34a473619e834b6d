//! All ClipSync protocol message types.
//!
//! Two kinds of payload exist:
//!
//! - [`WireMessage`] – one JSON object per line on a peer TCP connection.
//! - [`DiscoveryMessage`] – one JSON object per UDP datagram, broadcast by the
//!   host so peers can find it without manual configuration.
//!
//! Inside the application, clipboard content is modelled as the tagged
//! [`ClipboardContent`] enum; the string-typed wire envelope only exists at
//! the edge of the system.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// First TCP port the host tries to bind.
pub const DEFAULT_RELAY_PORT: u16 = 5150;

/// Number of consecutive ports probed, starting at [`DEFAULT_RELAY_PORT`].
pub const DEFAULT_PORT_RANGE: u16 = 20;

/// UDP port the discovery beacon is sent to and peers listen on.
pub const DEFAULT_DISCOVERY_PORT: u16 = 5149;

/// Device type advertised by the host.  Deployed mobile peers only accept
/// beacons carrying this value.
pub const HOST_DEVICE_TYPE: &str = "windows";

/// Upper bound on a single pending line.  A peer that exceeds it without
/// sending `\n` is disconnected.
pub const MAX_LINE_BYTES: usize = 32 * 1024 * 1024;

/// Value of the `type` field for clipboard content messages.
pub const CLIPBOARD_MESSAGE_TYPE: &str = "clipboard";

/// MIME type used for text content.
pub const MIME_TEXT_PLAIN: &str = "text/plain";

/// MIME type used for image content.
pub const MIME_IMAGE_PNG: &str = "image/png";

// ── Envelope tags ─────────────────────────────────────────────────────────────

/// The `type` field of a [`WireMessage`].
///
/// Unknown values are preserved in [`MessageKind::Unknown`] instead of failing
/// the decode, so newer peers can introduce message types without breaking
/// older hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    /// Clipboard content (`"clipboard"`).
    Clipboard,
    /// Any other tag; ignored by the relay.
    Unknown(String),
}

impl From<String> for MessageKind {
    fn from(value: String) -> Self {
        if value == CLIPBOARD_MESSAGE_TYPE {
            MessageKind::Clipboard
        } else {
            MessageKind::Unknown(value)
        }
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Clipboard => CLIPBOARD_MESSAGE_TYPE.to_string(),
            MessageKind::Unknown(value) => value,
        }
    }
}

/// The `contentType` field of a [`WireMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentType {
    /// `text/plain` – `content` is the raw text.
    TextPlain,
    /// `image/png` – `content` is standard base64 of the PNG bytes.
    ImagePng,
    /// Any other MIME type; ignored by the relay.
    Unknown(String),
}

impl From<String> for ContentType {
    fn from(value: String) -> Self {
        match value.as_str() {
            MIME_TEXT_PLAIN => ContentType::TextPlain,
            MIME_IMAGE_PNG => ContentType::ImagePng,
            _ => ContentType::Unknown(value),
        }
    }
}

impl From<ContentType> for String {
    fn from(content_type: ContentType) -> Self {
        match content_type {
            ContentType::TextPlain => MIME_TEXT_PLAIN.to_string(),
            ContentType::ImagePng => MIME_IMAGE_PNG.to_string(),
            ContentType::Unknown(value) => value,
        }
    }
}

// ── Wire envelope ─────────────────────────────────────────────────────────────

/// The serialized form of a clipboard update, exactly as it appears on the
/// wire.
///
/// ```json
/// {"type":"clipboard","contentType":"text/plain","content":"hello","timestamp":1700000000000}
/// ```
///
/// `timestamp` is advisory (milliseconds since the Unix epoch).  Mobile peers
/// sometimes omit it, so it defaults to 0 when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(rename = "contentType")]
    pub content_type: ContentType,
    pub content: String,
    #[serde(default)]
    pub timestamp: i64,
}

// ── Clipboard content ─────────────────────────────────────────────────────────

/// Clipboard content as a tagged variant.
#[derive(Clone, PartialEq, Eq)]
pub enum ClipboardContent {
    /// UTF-8 text.
    Text(String),
    /// An encoded PNG image.
    Image(Vec<u8>),
}

impl ClipboardContent {
    /// Returns the payload bytes (UTF-8 for text, PNG for images).
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ClipboardContent::Text(text) => text.as_bytes(),
            ClipboardContent::Image(png) => png,
        }
    }

    /// Short human-readable summary for log lines.
    ///
    /// Text is truncated to 30 characters; images are reported by size.
    pub fn preview(&self) -> String {
        match self {
            ClipboardContent::Text(text) => {
                let mut preview: String = text.chars().take(30).collect();
                if text.chars().count() > 30 {
                    preview.push_str("...");
                }
                preview
            }
            ClipboardContent::Image(png) => format!("<image {} KB>", png.len() / 1024),
        }
    }
}

// Image payloads can be megabytes; keep `{:?}` output readable.
impl fmt::Debug for ClipboardContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClipboardContent::Text(text) => f.debug_tuple("Text").field(text).finish(),
            ClipboardContent::Image(png) => write!(f, "Image({} bytes)", png.len()),
        }
    }
}

/// One observed clipboard change, local or remote.  Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardUpdate {
    content: ClipboardContent,
    captured_at_ms: i64,
}

impl ClipboardUpdate {
    /// Creates an update stamped with the current wall-clock time.
    pub fn now(content: ClipboardContent) -> Self {
        Self::at(content, current_timestamp_ms())
    }

    /// Creates an update with an explicit capture time.
    pub fn at(content: ClipboardContent, captured_at_ms: i64) -> Self {
        Self {
            content,
            captured_at_ms,
        }
    }

    /// Convenience constructor for a text update.
    pub fn text(text: impl Into<String>) -> Self {
        Self::now(ClipboardContent::Text(text.into()))
    }

    /// Convenience constructor for an image update.
    pub fn image(png: Vec<u8>) -> Self {
        Self::now(ClipboardContent::Image(png))
    }

    pub fn content(&self) -> &ClipboardContent {
        &self.content
    }

    pub fn captured_at_ms(&self) -> i64 {
        self.captured_at_ms
    }

    /// Consumes the update and returns its content.
    pub fn into_content(self) -> ClipboardContent {
        self.content
    }
}

// ── Discovery ─────────────────────────────────────────────────────────────────

/// The JSON datagram broadcast by the host on the discovery port.
///
/// ```json
/// {"deviceType":"windows","deviceName":"DESKTOP-1","ipAddress":"192.168.1.20","port":5150,"timestamp":1700000000000}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryMessage {
    pub device_type: String,
    pub device_name: String,
    pub ip_address: String,
    /// The TCP port the relay actually bound, after probing.
    pub port: u16,
    pub timestamp: i64,
}

/// Returns the current time as milliseconds since the Unix epoch.
pub fn current_timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_kind_maps_known_and_unknown_tags() {
        assert_eq!(
            MessageKind::from("clipboard".to_string()),
            MessageKind::Clipboard
        );
        assert_eq!(
            MessageKind::from("ping".to_string()),
            MessageKind::Unknown("ping".to_string())
        );
    }

    #[test]
    fn test_content_type_maps_mime_strings() {
        assert_eq!(
            ContentType::from("text/plain".to_string()),
            ContentType::TextPlain
        );
        assert_eq!(
            ContentType::from("image/png".to_string()),
            ContentType::ImagePng
        );
        assert_eq!(
            String::from(ContentType::Unknown("text/html".to_string())),
            "text/html"
        );
    }

    #[test]
    fn test_wire_message_timestamp_defaults_to_zero_when_absent() {
        // Arrange
        let json = r#"{"type":"clipboard","contentType":"text/plain","content":"world"}"#;

        // Act
        let msg: WireMessage = serde_json::from_str(json).expect("must parse");

        // Assert
        assert_eq!(msg.kind, MessageKind::Clipboard);
        assert_eq!(msg.content_type, ContentType::TextPlain);
        assert_eq!(msg.content, "world");
        assert_eq!(msg.timestamp, 0);
    }

    #[test]
    fn test_wire_message_serializes_with_camel_case_envelope() {
        // Arrange
        let msg = WireMessage {
            kind: MessageKind::Clipboard,
            content_type: ContentType::TextPlain,
            content: "hi".to_string(),
            timestamp: 7,
        };

        // Act
        let json = serde_json::to_string(&msg).unwrap();

        // Assert
        assert_eq!(
            json,
            r#"{"type":"clipboard","contentType":"text/plain","content":"hi","timestamp":7}"#
        );
    }

    #[test]
    fn test_discovery_message_uses_camel_case_fields() {
        let msg = DiscoveryMessage {
            device_type: "windows".to_string(),
            device_name: "desk".to_string(),
            ip_address: "10.0.0.2".to_string(),
            port: 5151,
            timestamp: 1,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""deviceType":"windows""#));
        assert!(json.contains(r#""ipAddress":"10.0.0.2""#));
        assert!(json.contains(r#""port":5151"#));
    }

    #[test]
    fn test_preview_truncates_long_text() {
        let content = ClipboardContent::Text("x".repeat(40));
        assert_eq!(content.preview(), format!("{}...", "x".repeat(30)));
    }

    #[test]
    fn test_preview_reports_image_size() {
        let content = ClipboardContent::Image(vec![0u8; 4096]);
        assert_eq!(content.preview(), "<image 4 KB>");
    }

    #[test]
    fn test_debug_does_not_dump_image_bytes() {
        let content = ClipboardContent::Image(vec![1u8; 10_000]);
        assert_eq!(format!("{content:?}"), "Image(10000 bytes)");
    }

    #[test]
    fn test_current_timestamp_ms_is_positive() {
        assert!(current_timestamp_ms() > 0);
    }
}
