//! Integration tests for the clipsync-core line codec.
//!
//! These tests push updates through the public API the way a relay and a peer
//! do together: encode on one side, frame through a [`LineBuffer`] fed with
//! arbitrary chunk sizes, decode and convert back on the other side.

use clipsync_core::protocol::codec::message_to_update;
use clipsync_core::{
    decode_line, encode_update, ClipboardContent, ClipboardUpdate, ContentType, LineBuffer,
};

/// Encodes an update, feeds it through a `LineBuffer` in `chunk`-sized
/// pieces and converts the single resulting line back into an update.
fn through_the_wire(update: &ClipboardUpdate, chunk: usize) -> ClipboardUpdate {
    let bytes = encode_update(update).expect("encode must succeed");
    let mut buffer = LineBuffer::new();
    let mut lines = Vec::new();
    for piece in bytes.chunks(chunk) {
        lines.extend(buffer.push(piece).expect("framing must succeed"));
    }
    assert_eq!(lines.len(), 1, "exactly one line per update");
    assert_eq!(buffer.pending_len(), 0, "nothing may be left over");

    let msg = decode_line(&lines[0]).expect("decode must succeed");
    message_to_update(msg)
        .expect("conversion must succeed")
        .expect("clipboard messages are never ignored")
}

#[test]
fn test_text_round_trips_through_chunked_framing() {
    let samples = [
        "hello",
        "  padded  ",
        "multi\nline\r\ntext",
        "quotes \" and backslashes \\",
        "emoji 📋 and CJK 剪贴板",
        "\u{0007} control \u{001b}[0m",
    ];

    for text in samples {
        for chunk in [1, 3, 4096] {
            let update = ClipboardUpdate::text(text);
            let decoded = through_the_wire(&update, chunk);
            assert_eq!(
                decoded.content(),
                &ClipboardContent::Text(text.to_string()),
                "text {text:?} with chunk size {chunk}"
            );
            assert_eq!(decoded.captured_at_ms(), update.captured_at_ms());
        }
    }
}

#[test]
fn test_image_bytes_round_trip_exactly() {
    // Arrange – a PNG signature followed by every byte value
    let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    png.extend(0u8..=255);
    let update = ClipboardUpdate::image(png.clone());

    // Act
    let decoded = through_the_wire(&update, 7);

    // Assert
    assert_eq!(decoded.into_content(), ClipboardContent::Image(png));
}

#[test]
fn test_two_messages_in_one_read_are_both_delivered_in_order() {
    // Arrange
    let mut bytes = encode_update(&ClipboardUpdate::text("first")).unwrap();
    bytes.extend(encode_update(&ClipboardUpdate::text("second")).unwrap());
    let mut buffer = LineBuffer::new();

    // Act
    let lines = buffer.push(&bytes).unwrap();

    // Assert
    let contents: Vec<String> = lines
        .iter()
        .map(|l| decode_line(l).unwrap().content)
        .collect();
    assert_eq!(contents, vec!["first", "second"]);
}

#[test]
fn test_malformed_line_does_not_disturb_following_line() {
    // Arrange
    let mut bytes = b"not-json\n".to_vec();
    bytes.extend_from_slice(b"{\"type\":\"clipboard\",\"contentType\":\"text/plain\",\"content\":\"ok\"}\n");
    let mut buffer = LineBuffer::new();

    // Act
    let lines = buffer.push(&bytes).unwrap();

    // Assert
    assert_eq!(lines.len(), 2);
    assert!(decode_line(&lines[0]).is_err());
    let valid = decode_line(&lines[1]).unwrap();
    assert_eq!(valid.content_type, ContentType::TextPlain);
    assert_eq!(valid.content, "ok");
}
