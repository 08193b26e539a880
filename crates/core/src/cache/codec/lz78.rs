//! Pure LZ78 dictionary coder.
//!
//! The encoded text is a run of `<index>:<char>` tokens, where `<index>` is
//! the decimal dictionary entry of the longest already-seen prefix (0 for the
//! empty phrase) and `<char>` is exactly one character extending it. When the
//! input ends on a known phrase the final token is a bare `<index>`.

use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;

use super::{CodecError, CodecKind, CompressionBackend};

#[derive(Debug, Clone, Copy, Default)]
pub struct Lz78Backend;

impl CompressionBackend for Lz78Backend {
    fn kind(&self) -> CodecKind {
        CodecKind::Lz78
    }

    fn encode(&self, text: &str) -> Result<String, CodecError> {
        Ok(encode(text))
    }

    fn decode(&self, data: &str) -> Result<String, CodecError> {
        decode(data)
    }
}

fn encode(text: &str) -> String {
    let mut dictionary: HashMap<(u32, char), u32> = HashMap::new();
    let mut next_index: u32 = 1;
    let mut current: u32 = 0;
    let mut out = String::with_capacity(text.len() / 2);

    for c in text.chars() {
        if let Some(&index) = dictionary.get(&(current, c)) {
            current = index;
            continue;
        }
        out.push_str(&current.to_string());
        out.push(':');
        out.push(c);
        dictionary.insert((current, c), next_index);
        next_index += 1;
        current = 0;
    }

    if current != 0 {
        out.push_str(&current.to_string());
    }
    out
}

fn decode(data: &str) -> Result<String, CodecError> {
    // Entry `i + 1` is `(prefix index, final char)`.
    let mut entries: Vec<(u32, char)> = Vec::new();
    let mut out = String::with_capacity(data.len() * 2);
    let mut chars = data.chars().peekable();
    let mut token = 0usize;

    while chars.peek().is_some() {
        let index = read_index(&mut chars, token)?;
        if index as usize > entries.len() {
            return Err(CodecError::InvalidCompressedData(format!(
                "token {token} references entry {index} of {}",
                entries.len()
            )));
        }

        match chars.next() {
            Some(':') => {
                let c = chars.next().ok_or_else(|| {
                    CodecError::InvalidCompressedData(format!("token {token} ends after separator"))
                })?;
                push_phrase(&entries, index, &mut out);
                out.push(c);
                entries.push((index, c));
            }
            Some(other) => {
                return Err(CodecError::InvalidCompressedData(format!(
                    "token {token} expected ':' but found {other:?}"
                )));
            }
            None => push_phrase(&entries, index, &mut out),
        }
        token += 1;
    }

    Ok(out)
}

fn read_index(chars: &mut Peekable<Chars<'_>>, token: usize) -> Result<u32, CodecError> {
    let mut index: u32 = 0;
    let mut digits = 0;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        index = index
            .checked_mul(10)
            .and_then(|v| v.checked_add(d))
            .ok_or_else(|| CodecError::InvalidCompressedData(format!("token {token} index overflows")))?;
        chars.next();
        digits += 1;
    }
    if digits == 0 {
        return Err(CodecError::InvalidCompressedData(format!("token {token} has no index")));
    }
    Ok(index)
}

/// Append the phrase stored at `index` (0 is the empty phrase).
fn push_phrase(entries: &[(u32, char)], index: u32, out: &mut String) {
    let mut reversed = Vec::new();
    let mut cursor = index;
    while cursor != 0 {
        let (prefix, c) = entries[cursor as usize - 1];
        reversed.push(c);
        cursor = prefix;
    }
    out.extend(reversed.into_iter().rev());
}
