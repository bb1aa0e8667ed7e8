//! Reassembly of newline-delimited messages from a TCP byte stream.
//!
//! TCP delivers bytes, not messages.  One read may end in the middle of a
//! message, or carry several messages at once.  The bytes after the last
//! delimiter of a delivery are kept as the *tail* and prepended to the next
//! delivery, so the sequence of messages produced never depends on how the
//! stream was chunked.

use crate::protocol::messages::MESSAGE_DELIMITER;

/// Splits `new_bytes` into complete message texts, continuing `previous_tail`.
///
/// Returns the complete messages in wire order (delimiters stripped) and the
/// bytes that follow the last delimiter, which the caller passes back as
/// `previous_tail` on the next call.  When `new_bytes` has no delimiter the
/// returned tail is `previous_tail` followed by `new_bytes`.
pub fn decode_stream(previous_tail: &[u8], new_bytes: &[u8]) -> (Vec<String>, Vec<u8>) {
    let mut messages = Vec::new();
    let mut start = 0;

    for (i, &byte) in new_bytes.iter().enumerate() {
        if byte != MESSAGE_DELIMITER {
            continue;
        }
        if start == 0 && !previous_tail.is_empty() {
            let mut joined = String::with_capacity(previous_tail.len() + i);
            push_latin1(&mut joined, previous_tail);
            push_latin1(&mut joined, &new_bytes[..i]);
            messages.push(joined);
        } else {
            let mut text = String::with_capacity(i - start);
            push_latin1(&mut text, &new_bytes[start..i]);
            messages.push(text);
        }
        start = i + 1;
    }

    let tail = if start == 0 {
        let mut tail = Vec::with_capacity(previous_tail.len() + new_bytes.len());
        tail.extend_from_slice(previous_tail);
        tail.extend_from_slice(new_bytes);
        tail
    } else {
        new_bytes[start..].to_vec()
    };

    (messages, tail)
}

/// Stateful wrapper around [`decode_stream`] that owns the reassembly buffer.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    tail: Vec<u8>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one delivery and returns the messages it completed.
    pub fn decode(&mut self, bytes: &[u8]) -> Vec<String> {
        let (messages, tail) = decode_stream(&self.tail, bytes);
        self.tail = tail;
        messages
    }

    /// Bytes of the incomplete trailing message held so far.
    pub fn pending(&self) -> &[u8] {
        &self.tail
    }

    /// Discards any incomplete trailing message.
    pub fn reset(&mut self) {
        if !self.tail.is_empty() {
            tracing::debug!(bytes = self.tail.len(), "discarding incomplete message");
        }
        self.tail.clear();
    }
}

/// Appends single-byte text: every byte becomes the char with the same code point.
fn push_latin1(out: &mut String, bytes: &[u8]) {
    out.extend(bytes.iter().map(|&b| char::from(b)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_complete_message_leaves_empty_tail() {
        let (messages, tail) = decode_stream(&[], b"T,hello\n");
        assert_eq!(messages, vec!["T,hello"]);
        assert!(tail.is_empty());
    }

    #[test]
    fn test_multiple_messages_in_one_delivery_keep_order() {
        let (messages, tail) = decode_stream(&[], b"D,1\nD,2\nD,3\n");
        assert_eq!(messages, vec!["D,1", "D,2", "D,3"]);
        assert!(tail.is_empty());
    }

    #[test]
    fn test_no_delimiter_appends_to_previous_tail() {
        // Arrange
        let (first, tail) = decode_stream(&[], b"U,1,");
        // Act
        let (second, tail) = decode_stream(&tail, b"2.0");

        // Assert
        assert!(first.is_empty());
        assert!(second.is_empty());
        assert_eq!(tail, b"U,1,2.0");
    }

    #[test]
    fn test_tail_is_prefixed_to_first_message_only() {
        let (messages, tail) = decode_stream(b"T,ab", b"c\nT,x\nT,y");
        assert_eq!(messages, vec!["T,abc", "T,x"]);
        assert_eq!(tail, b"T,y");
    }

    #[test]
    fn test_delimiter_at_start_closes_previous_tail() {
        let (messages, tail) = decode_stream(b"D,9", b"\n");
        assert_eq!(messages, vec!["D,9"]);
        assert!(tail.is_empty());
    }

    #[test]
    fn test_empty_line_yields_empty_message() {
        let (messages, _) = decode_stream(&[], b"\n");
        assert_eq!(messages, vec![String::new()]);
    }

    #[test]
    fn test_high_bytes_decode_as_latin1() {
        let (messages, _) = decode_stream(&[], &[b'T', b',', 0xE9, b'\n']);
        assert_eq!(messages, vec!["T,\u{e9}"]);
    }

    #[test]
    fn test_stream_decoder_spans_many_deliveries() {
        // Arrange
        let mut decoder = StreamDecoder::new();

        // Act
        assert!(decoder.decode(b"S,1,2").is_empty());
        assert!(decoder.decode(b",3,4,5").is_empty());
        assert_eq!(decoder.pending(), b"S,1,2,3,4,5");
        let messages = decoder.decode(b",6,sign, text\nD");

        // Assert
        assert_eq!(messages, vec!["S,1,2,3,4,5,6,sign, text"]);
        assert_eq!(decoder.pending(), b"D");
    }

    #[test]
    fn test_stream_decoder_reset_discards_partial_message() {
        let mut decoder = StreamDecoder::new();
        decoder.decode(b"U,1,2");
        decoder.reset();
        assert_eq!(decoder.decode(b"D,4\n"), vec!["D,4"]);
    }

    #[test]
    fn test_chunking_does_not_change_output() {
        let stream = b"U,1,2.0,3.0,4.0,5.0,6.0\nN,1,bob\nT,hi, there\nD,1\n";
        let (whole, _) = decode_stream(&[], stream);

        for chunk_size in 1..stream.len() {
            let mut decoder = StreamDecoder::new();
            let mut pieces = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                pieces.extend(decoder.decode(chunk));
            }
            assert_eq!(pieces, whole, "chunk size {chunk_size}");
            assert!(decoder.pending().is_empty());
        }
    }
}
