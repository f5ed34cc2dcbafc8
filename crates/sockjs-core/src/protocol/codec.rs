//! Text codec for protocol frames.
//!
//! Wire format (one frame per HTTP body or per streamed line):
//!
//! ```text
//! o                      opening frame, no payload
//! h                      heartbeat frame, no payload
//! a["msg1","msg2"]       message array, JSON array of strings
//! c[3000,"Go away!"]     closing frame, [status, reason]
//! ```
//!
//! # Why escape at all? (for beginners)
//!
//! JSON happily carries any Unicode code point, but browsers and proxies do
//! not carry every code point happily.  Some transports evaluate the payload
//! as a script (JSONP), where U+2028/U+2029 terminate a string literal, and
//! some intermediaries silently rewrite bidirectional-override and
//! zero-width characters.  The codec therefore rewrites every code point in a
//! fixed "unsafe" set to a `\uXXXX` escape *after* JSON serialization, on
//! every transport, so every client decodes the same text.
//!
//! The unsafe set is:
//!
//! | Range               | What lives there                         |
//! |---------------------|------------------------------------------|
//! | `U+0000`–`U+001F`   | C0 control characters                    |
//! | `U+200C`–`U+200F`   | zero-width joiners, LRM/RLM marks        |
//! | `U+2028`–`U+202F`   | line/paragraph separators, bidi embeds   |
//! | `U+2060`–`U+206F`   | invisible format controls                |
//! | `U+FFF0`–`U+FFFF`   | specials block, noncharacters            |

use serde_json::Value;
use thiserror::Error;

/// Tag of the opening frame.
pub const OPENING_FRAME: &str = "o";
/// Tag prefix of the closing frame.
pub const CLOSING_FRAME: &str = "c";
/// Tag prefix of the message-array frame.
pub const ARRAY_FRAME: &str = "a";
/// Tag of the heartbeat frame.
pub const HEARTBEAT_FRAME: &str = "h";

/// Errors raised by the dynamically typed encode entry points.
///
/// The typed functions ([`encode_array`], [`encode_closing`]) cannot fail:
/// the compiler already rejects a non-sequence or a non-integer status.  The
/// `*_value` variants accept arbitrary JSON and must check the shape at run
/// time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// A value did not have the JSON shape the frame requires.
    #[error("{expected} expected, but value is {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

// ── Escaping ──────────────────────────────────────────────────────────────────

/// Returns `true` if `c` must be sent as a `\uXXXX` escape.
pub fn is_unsafe(c: char) -> bool {
    matches!(
        c,
        '\u{0000}'..='\u{001f}'
            | '\u{200c}'..='\u{200f}'
            | '\u{2028}'..='\u{202f}'
            | '\u{2060}'..='\u{206f}'
            | '\u{fff0}'..='\u{ffff}'
    )
}

/// Replaces every unsafe code point in `text` with its `\uXXXX` form.
///
/// Hex digits are lower-case and zero-padded to four places.  All other
/// characters, including multi-byte ones outside the unsafe set, are copied
/// unchanged.
///
/// No de-escaping happens anywhere in this crate, so re-applying `escape` is
/// only a no-op when the input holds no unsafe code points.
///
/// # Examples
///
/// ```rust
/// use sockjs_core::escape;
///
/// assert_eq!(escape("plain"), "plain");
/// assert_eq!(escape("a\u{2028}b"), "a\\u2028b");
/// ```
pub fn escape(text: &str) -> String {
    // Fast path: most payloads contain nothing to escape.
    if !text.chars().any(is_unsafe) {
        return text.to_owned();
    }

    let mut out = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        if is_unsafe(c) {
            out.push_str(&format!("\\u{:04x}", u32::from(c)));
        } else {
            out.push(c);
        }
    }
    out
}

// ── Typed encoders ────────────────────────────────────────────────────────────

/// Encodes an ordered sequence of messages as an `a` frame.
///
/// The messages are serialized as a JSON array of strings, the resulting text
/// is escaped, and the array tag is prepended.
///
/// # Examples
///
/// ```rust
/// use sockjs_core::encode_array;
///
/// assert_eq!(encode_array(&["hi", "there"]), r#"a["hi","there"]"#);
/// ```
pub fn encode_array<S: AsRef<str>>(messages: &[S]) -> String {
    let json = Value::Array(
        messages
            .iter()
            .map(|m| Value::String(m.as_ref().to_owned()))
            .collect(),
    )
    .to_string();
    format!("{ARRAY_FRAME}{}", escape(&json))
}

/// Encodes a `c[status,"reason"]` closing frame.
///
/// # Examples
///
/// ```rust
/// use sockjs_core::encode_closing;
///
/// assert_eq!(encode_closing(3000, "Go away!"), r#"c[3000,"Go away!"]"#);
/// ```
pub fn encode_closing(status: u16, reason: &str) -> String {
    let reason_json = Value::String(reason.to_owned()).to_string();
    format!("{CLOSING_FRAME}[{status},{}]", escape(&reason_json))
}

// ── Dynamic encoders ──────────────────────────────────────────────────────────

/// Encodes an `a` frame from an arbitrary JSON value.
///
/// # Errors
///
/// Returns [`CodecError::TypeMismatch`] if `value` is not a JSON array.
pub fn encode_array_value(value: &Value) -> Result<String, CodecError> {
    if !value.is_array() {
        return Err(CodecError::TypeMismatch {
            expected: "array",
            found: kind_of(value),
        });
    }
    Ok(format!("{ARRAY_FRAME}{}", escape(&value.to_string())))
}

/// Encodes a closing frame from arbitrary JSON values.
///
/// # Errors
///
/// Returns [`CodecError::TypeMismatch`] if `status` is not an integer that
/// fits a close code, or if `reason` is not a string.
pub fn encode_closing_value(status: &Value, reason: &Value) -> Result<String, CodecError> {
    let status = status
        .as_u64()
        .and_then(|s| u16::try_from(s).ok())
        .ok_or(CodecError::TypeMismatch {
            expected: "integer in 0..=65535",
            found: match kind_of(status) {
                "integer" => "an out-of-range integer",
                other => other,
            },
        })?;
    let reason = reason.as_str().ok_or(CodecError::TypeMismatch {
        expected: "string",
        found: kind_of(reason),
    })?;
    Ok(encode_closing(status, reason))
}

/// Human-readable JSON type name used in [`CodecError`] messages.
fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_u64() || n.is_i64() => "integer",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── escape ────────────────────────────────────────────────────────────────

    #[test]
    fn test_escape_leaves_ascii_text_unchanged() {
        assert_eq!(escape("hello, world"), "hello, world");
    }

    #[test]
    fn test_escape_leaves_multibyte_safe_text_unchanged() {
        // Arrange: CJK, accented Latin, emoji (outside the BMP) are all safe.
        let text = "héllo 世界 🚀 \u{00a0}";

        // Act / Assert
        assert_eq!(escape(text), text);
    }

    #[test]
    fn test_escape_rewrites_c0_controls_lowercase_padded() {
        assert_eq!(escape("\u{0000}"), "\\u0000");
        assert_eq!(escape("\u{001f}"), "\\u001f");
        assert_eq!(escape("a\nb"), "a\\u000ab");
    }

    #[test]
    fn test_escape_rewrites_line_and_paragraph_separators() {
        assert_eq!(escape("\u{2028}\u{2029}"), "\\u2028\\u2029");
    }

    #[test]
    fn test_escape_range_boundaries() {
        // Just outside each range must survive; just inside must be escaped.
        assert_eq!(escape("\u{0020}"), " ");
        assert_eq!(escape("\u{200b}"), "\u{200b}");
        assert_eq!(escape("\u{200c}"), "\\u200c");
        assert_eq!(escape("\u{200f}"), "\\u200f");
        assert_eq!(escape("\u{2010}"), "\u{2010}");
        assert_eq!(escape("\u{2027}"), "\u{2027}");
        assert_eq!(escape("\u{202f}"), "\\u202f");
        assert_eq!(escape("\u{2030}"), "\u{2030}");
        assert_eq!(escape("\u{205f}"), "\u{205f}");
        assert_eq!(escape("\u{2060}"), "\\u2060");
        assert_eq!(escape("\u{206f}"), "\\u206f");
        assert_eq!(escape("\u{2070}"), "\u{2070}");
        assert_eq!(escape("\u{ffef}"), "\u{ffef}");
        assert_eq!(escape("\u{fff0}"), "\\ufff0");
        assert_eq!(escape("\u{ffff}"), "\\uffff");
    }

    #[test]
    fn test_escape_output_contains_no_unsafe_code_points() {
        // Arrange: every unsafe code point, interleaved with safe text.
        let mut text = String::new();
        for cp in 0u32..=0xffff {
            if let Some(c) = char::from_u32(cp) {
                if is_unsafe(c) {
                    text.push('x');
                    text.push(c);
                }
            }
        }

        // Act
        let escaped = escape(&text);

        // Assert
        assert!(!escaped.chars().any(is_unsafe));
    }

    // ── encode_array ──────────────────────────────────────────────────────────

    #[test]
    fn test_encode_array_two_messages() {
        assert_eq!(encode_array(&["hi", "there"]), r#"a["hi","there"]"#);
    }

    #[test]
    fn test_encode_array_escapes_quotes_via_json() {
        assert_eq!(encode_array(&[r#"say "x""#]), r#"a["say \"x\""]"#);
    }

    #[test]
    fn test_encode_array_escapes_unsafe_after_json() {
        // Arrange: serde_json leaves U+2028 raw; the escape pass must catch it.
        let frame = encode_array(&["a\u{2028}b"]);

        // Assert
        assert_eq!(frame, "a[\"a\\u2028b\"]");
    }

    #[test]
    fn test_encode_array_accepts_owned_strings() {
        let messages = vec!["one".to_string(), "two".to_string()];
        assert_eq!(encode_array(&messages), r#"a["one","two"]"#);
    }

    // ── encode_closing ────────────────────────────────────────────────────────

    #[test]
    fn test_encode_closing_go_away() {
        assert_eq!(encode_closing(3000, "Go away!"), r#"c[3000,"Go away!"]"#);
    }

    #[test]
    fn test_encode_closing_escapes_reason() {
        assert_eq!(
            encode_closing(1002, "bad\u{2029}"),
            "c[1002,\"bad\\u2029\"]"
        );
    }

    // ── dynamic encoders ──────────────────────────────────────────────────────

    #[test]
    fn test_encode_array_value_accepts_array() {
        let frame = encode_array_value(&json!(["x", 1])).unwrap();
        assert_eq!(frame, r#"a["x",1]"#);
    }

    #[test]
    fn test_encode_array_value_rejects_non_array() {
        // Act
        let result = encode_array_value(&json!({"not": "a sequence"}));

        // Assert
        assert_eq!(
            result,
            Err(CodecError::TypeMismatch {
                expected: "array",
                found: "object"
            })
        );
    }

    #[test]
    fn test_encode_closing_value_rejects_float_status() {
        let result = encode_closing_value(&json!(3000.5), &json!("x"));
        assert!(matches!(
            result,
            Err(CodecError::TypeMismatch { expected: "integer in 0..=65535", found: "float" })
        ));
    }

    #[test]
    fn test_encode_closing_value_reports_out_of_range_status() {
        // Arrange / Act
        let negative = encode_closing_value(&json!(-1), &json!("x")).unwrap_err();
        let too_big = encode_closing_value(&json!(70000), &json!("x")).unwrap_err();

        // Assert: the message names the range, not just the type
        for err in [negative, too_big] {
            assert_eq!(
                err.to_string(),
                "integer in 0..=65535 expected, but value is an out-of-range integer"
            );
        }
    }

    #[test]
    fn test_encode_closing_value_rejects_non_string_reason() {
        let result = encode_closing_value(&json!(3000), &json!(42));
        assert!(matches!(
            result,
            Err(CodecError::TypeMismatch { expected: "string", found: "integer" })
        ));
    }

    #[test]
    fn test_encode_closing_value_accepts_valid_shapes() {
        let frame = encode_closing_value(&json!(3000), &json!("Go away!")).unwrap();
        assert_eq!(frame, r#"c[3000,"Go away!"]"#);
    }

    #[test]
    fn test_type_mismatch_error_message() {
        let err = CodecError::TypeMismatch {
            expected: "array",
            found: "string",
        };
        assert_eq!(err.to_string(), "array expected, but value is string");
    }
}
