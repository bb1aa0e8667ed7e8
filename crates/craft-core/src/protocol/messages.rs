//! Message types and the per-command field grammar of the Craft protocol.
//!
//! Every message on the wire is one line of single-byte text:
//!
//! ```text
//! <code>,<field1>,<field2>,...,<fieldN>\n
//! ```
//!
//! The command code is exactly one character.  How the comma-separated
//! fields after it are interpreted is fixed per command by the
//! [`FieldTypeTable`].  Commands that have no table entry carry the whole
//! remainder of the line as one opaque text field.

use std::fmt;

/// Byte that terminates one message in the stream (line feed).
pub const MESSAGE_DELIMITER: u8 = b'\n';

/// Separator between the fields of one message.
pub const FIELD_SEPARATOR: char = ',';

/// Protocol version announced by the keepalive command.
pub const PROTOCOL_VERSION: i64 = 1;

/// Command code of the version announcement sent as keepalive.
pub const VERSION_COMMAND: char = 'V';

/// Grammar tag for one field position of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Signed decimal integer.
    Integer,
    /// Finite decimal floating point number.
    Float,
    /// Everything up to the end of the message, commas included.
    ///
    /// Always the final tag of a command's grammar.
    RestOfString,
}

/// One decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Field {
    /// Returns the integer value, if this is an integer field.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Field::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the float value, if this is a float field.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Field::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text value, if this is a text field.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Field::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Integer(v) => write!(f, "{v}"),
            Field::Float(v) => write!(f, "{v}"),
            Field::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for Field {
    fn from(v: i64) -> Self {
        Field::Integer(v)
    }
}

impl From<i32> for Field {
    fn from(v: i32) -> Self {
        Field::Integer(i64::from(v))
    }
}

impl From<u32> for Field {
    fn from(v: u32) -> Self {
        Field::Integer(i64::from(v))
    }
}

impl From<f64> for Field {
    fn from(v: f64) -> Self {
        Field::Float(v)
    }
}

impl From<f32> for Field {
    fn from(v: f32) -> Self {
        Field::Float(f64::from(v))
    }
}

impl From<String> for Field {
    fn from(v: String) -> Self {
        Field::Text(v)
    }
}

impl From<&str> for Field {
    fn from(v: &str) -> Self {
        Field::Text(v.to_string())
    }
}

/// A decoded protocol message: a command code plus its fields in wire order.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Single-character command code.
    pub code: char,
    /// Decoded fields, not including the command code.
    pub fields: Vec<Field>,
}

impl Message {
    pub fn new(code: char, fields: Vec<Field>) -> Self {
        Self { code, fields }
    }

    /// Returns `true` if this command has an entry in the [`FieldTypeTable`].
    pub fn is_typed(&self) -> bool {
        FieldTypeTable::lookup(self.code).is_some()
    }
}

/// Read-only mapping from command code to the ordered field grammar.
///
/// | Code | Grammar                         | Meaning                    |
/// |------|---------------------------------|----------------------------|
/// | `U`  | `I F F F F F`                   | own player id + position   |
/// | `P`  | `I F F F F F`                   | other player position      |
/// | `N`  | `I S`                           | player nickname            |
/// | `D`  | `I`                             | player disconnected        |
/// | `B`  | `I I I I I I`                   | block change               |
/// | `C`  | `I I I`                         | chunk key                  |
/// | `K`  | `I I I`                         | chunk key (cache)          |
/// | `S`  | `I I I I I I S`                 | sign text                  |
///
/// `V` (version) and `T` (chat text) are not listed; they pass through as a
/// single text field.
pub struct FieldTypeTable;

use FieldType::{Float as F, Integer as I, RestOfString as S};

const POSITION: &[FieldType] = &[I, F, F, F, F, F];
const NICKNAME: &[FieldType] = &[I, S];
const DISCONNECT: &[FieldType] = &[I];
const BLOCK: &[FieldType] = &[I, I, I, I, I, I];
const CHUNK: &[FieldType] = &[I, I, I];
const SIGN: &[FieldType] = &[I, I, I, I, I, I, S];

impl FieldTypeTable {
    /// Every command code that has a fixed grammar.
    pub const CODES: [char; 8] = ['U', 'P', 'N', 'D', 'B', 'C', 'K', 'S'];

    /// Returns the field grammar for `code`, or `None` for opaque commands.
    pub fn lookup(code: char) -> Option<&'static [FieldType]> {
        match code {
            'U' | 'P' => Some(POSITION),
            'N' => Some(NICKNAME),
            'D' => Some(DISCONNECT),
            'B' => Some(BLOCK),
            'C' | 'K' => Some(CHUNK),
            'S' => Some(SIGN),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rest_of_string_is_always_the_last_tag() {
        for code in FieldTypeTable::CODES {
            let grammar = FieldTypeTable::lookup(code).unwrap();
            if let Some(pos) = grammar.iter().position(|t| *t == FieldType::RestOfString) {
                assert_eq!(pos, grammar.len() - 1, "command {code} has RestOfString before the end");
            }
        }
    }

    #[test]
    fn test_version_and_text_commands_are_opaque() {
        assert!(FieldTypeTable::lookup('V').is_none());
        assert!(FieldTypeTable::lookup('T').is_none());
    }

    #[test]
    fn test_position_grammar_is_one_integer_then_five_floats() {
        assert_eq!(FieldTypeTable::lookup('U'), Some(POSITION));
        assert_eq!(POSITION.len(), 6);
        assert_eq!(POSITION[0], FieldType::Integer);
        assert!(POSITION[1..].iter().all(|t| *t == FieldType::Float));
    }

    #[test]
    fn test_field_display_matches_wire_text() {
        assert_eq!(Field::Integer(-7).to_string(), "-7");
        assert_eq!(Field::Float(2.5).to_string(), "2.5");
        assert_eq!(Field::Text("a,b".into()).to_string(), "a,b");
    }

    #[test]
    fn test_field_accessors() {
        assert_eq!(Field::from(3).as_integer(), Some(3));
        assert_eq!(Field::from(1.5).as_float(), Some(1.5));
        assert_eq!(Field::from("x").as_text(), Some("x"));
        assert_eq!(Field::from("x").as_integer(), None);
    }

    #[test]
    fn test_message_is_typed_follows_table() {
        assert!(Message::new('U', vec![]).is_typed());
        assert!(!Message::new('Z', vec![]).is_typed());
    }
}
