//! Text codec for single Craft protocol messages.
//!
//! Wire format of one message (delimiter already stripped on decode):
//! ```text
//! <code:1 char>,<field>,<field>,...
//! ```
//! Numeric fields never contain a comma.  A `RestOfString` field runs to the
//! end of the message and may contain commas.

use thiserror::Error;

use crate::protocol::messages::{
    Field, FieldType, FieldTypeTable, Message, FIELD_SEPARATOR, MESSAGE_DELIMITER,
};

/// Errors that can occur while decoding one message.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProtocolError {
    /// The message is not `<code>,...` or is missing required fields.
    #[error("malformed command {message:?}: {reason}")]
    MalformedCommand {
        message: String,
        reason: &'static str,
    },

    /// A field declared `Integer` or `Float` does not hold a number.
    #[error("field {index} of {message:?} is not a number: {field:?}")]
    NonNumericField {
        message: String,
        index: usize,
        field: String,
    },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes one message text into a [`Message`].
///
/// Commands listed in the [`FieldTypeTable`] are parsed field by field.
/// Any other command yields a single [`Field::Text`] holding everything after
/// the separator.
///
/// # Errors
///
/// - [`ProtocolError::MalformedCommand`] when the character after the command
///   code is not the field separator, or when the message has fewer fields
///   than the command's grammar requires.
/// - [`ProtocolError::NonNumericField`] when a numeric field fails to parse.
///
/// # Examples
///
/// ```rust
/// use craft_core::protocol::{decode_message, Field};
///
/// let msg = decode_message("D,42").unwrap();
/// assert_eq!(msg.code, 'D');
/// assert_eq!(msg.fields, vec![Field::Integer(42)]);
/// ```
pub fn decode_message(text: &str) -> Result<Message, ProtocolError> {
    let mut chars = text.chars();
    let code = match (chars.next(), chars.next()) {
        (Some(code), Some(FIELD_SEPARATOR)) => code,
        _ => {
            return Err(ProtocolError::MalformedCommand {
                message: text.to_string(),
                reason: "command code must be one character followed by a separator",
            })
        }
    };
    let body = chars.as_str();

    match FieldTypeTable::lookup(code) {
        Some(grammar) => decode_fields(text, code, body, grammar),
        None => Ok(Message::new(code, vec![Field::Text(body.to_string())])),
    }
}

/// Encodes a command code and its arguments into wire bytes.
///
/// Fields are joined with the separator and the message delimiter is
/// appended.  Nothing is escaped.  Characters outside the single-byte range
/// are written as `?`.
///
/// # Examples
///
/// ```rust
/// use craft_core::protocol::{encode_message, Field};
///
/// let bytes = encode_message('A', &[Field::from("bob"), Field::from("tok")]);
/// assert_eq!(bytes, b"A,bob,tok\n");
/// ```
pub fn encode_message(code: char, fields: &[Field]) -> Vec<u8> {
    let mut text = String::new();
    text.push(code);
    for field in fields {
        text.push(FIELD_SEPARATOR);
        text.push_str(&field.to_string());
    }

    let mut buf = Vec::with_capacity(text.len() + 1);
    buf.extend(text.chars().map(|c| u8::try_from(c).unwrap_or(b'?')));
    buf.push(MESSAGE_DELIMITER);
    buf
}

/// Encodes a decoded [`Message`] back into wire bytes.
pub fn encode(msg: &Message) -> Vec<u8> {
    encode_message(msg.code, &msg.fields)
}

// ── Field decoding ────────────────────────────────────────────────────────────

fn decode_fields(
    text: &str,
    code: char,
    body: &str,
    grammar: &[FieldType],
) -> Result<Message, ProtocolError> {
    let mut fields = Vec::with_capacity(grammar.len());
    let mut rest = Some(body);

    for (index, field_type) in grammar.iter().enumerate() {
        let Some(remaining) = rest else {
            return Err(ProtocolError::MalformedCommand {
                message: text.to_string(),
                reason: "fewer fields than the command requires",
            });
        };

        let raw = match field_type {
            FieldType::RestOfString => {
                fields.push(Field::Text(remaining.to_string()));
                break;
            }
            FieldType::Integer | FieldType::Float => match remaining.split_once(FIELD_SEPARATOR) {
                Some((raw, after)) => {
                    rest = Some(after);
                    raw
                }
                None => {
                    rest = None;
                    remaining
                }
            },
        };

        let parsed = if *field_type == FieldType::Integer {
            raw.parse::<i64>().ok().map(Field::Integer)
        } else {
            raw.parse::<f64>().ok().filter(|v| v.is_finite()).map(Field::Float)
        };

        match parsed {
            Some(field) => fields.push(field),
            None => {
                return Err(ProtocolError::NonNumericField {
                    message: text.to_string(),
                    index,
                    field: raw.to_string(),
                })
            }
        }
    }

    Ok(Message::new(code, fields))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
