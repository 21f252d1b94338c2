//! `{name}` placeholder templates with `{{` / `}}` escapes.

use serde_json::{Map, Value};

use crate::error::{ParleyError, Result};
use crate::provider::format::value_to_text;

/// Arguments substituted into a prompt template.
pub type PromptArgs = Map<String, Value>;

enum Piece<'a> {
    Text(&'a str),
    Brace(char),
    Field(&'a str),
}

fn tokenize<'a>(path: &str, source: &'a str) -> Result<Vec<Piece<'a>>> {
    let err = |message: String| ParleyError::Template {
        path: path.to_string(),
        message,
    };
    let mut pieces = Vec::new();
    let bytes = source.as_bytes();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' if bytes.get(i + 1) == Some(&b'{') => {
                pieces.push(Piece::Text(&source[start..i]));
                pieces.push(Piece::Brace('{'));
                i += 2;
                start = i;
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => {
                pieces.push(Piece::Text(&source[start..i]));
                pieces.push(Piece::Brace('}'));
                i += 2;
                start = i;
            }
            b'{' => {
                let close = source[i + 1..]
                    .find('}')
                    .ok_or_else(|| err(format!("unclosed '{{' at byte {i}")))?;
                let name = &source[i + 1..i + 1 + close];
                if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(err(format!("invalid placeholder '{{{name}}}'")));
                }
                pieces.push(Piece::Text(&source[start..i]));
                pieces.push(Piece::Field(name));
                i += close + 2;
                start = i;
            }
            b'}' => return Err(err(format!("single '}}' at byte {i}"))),
            _ => i += 1,
        }
    }
    pieces.push(Piece::Text(&source[start..]));
    Ok(pieces)
}

/// Placeholder names in order of first appearance.
pub fn placeholders(path: &str, source: &str) -> Result<Vec<String>> {
    let mut names: Vec<String> = Vec::new();
    for piece in tokenize(path, source)? {
        if let Piece::Field(name) = piece {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

/// Substitute `args` into `source`.
///
/// With no arguments the template is returned untouched, so prompts that
/// contain literal JSON need no escaping unless they also take arguments.
pub fn render(path: &str, source: &str, args: &PromptArgs) -> Result<String> {
    if args.is_empty() {
        return Ok(source.to_string());
    }
    let mut out = String::with_capacity(source.len());
    for piece in tokenize(path, source)? {
        match piece {
            Piece::Text(text) => out.push_str(text),
            Piece::Brace(c) => out.push(c),
            Piece::Field(name) => {
                let value = args.get(name).ok_or_else(|| ParleyError::Template {
                    path: path.to_string(),
                    message: format!("missing argument '{name}'"),
                })?;
                out.push_str(&value_to_text(value));
            }
        }
    }
    Ok(out)
}
