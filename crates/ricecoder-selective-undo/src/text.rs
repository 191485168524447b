//! Char-offset helpers
//!
//! Every offset and length handled by the engine counts Unicode scalar
//! values, so slicing has to go through these helpers rather than byte
//! indices.

/// Number of chars in `text`
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Byte index of the char at `offset`, or `text.len()` when `offset` is the end.
/// Returns `None` when `offset` lies past the end of the text.
pub fn byte_index(text: &str, offset: usize) -> Option<usize> {
    if offset == 0 {
        return Some(0);
    }
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == offset {
            return Some(idx);
        }
        count += 1;
    }
    (count == offset).then_some(text.len())
}

/// Chars `[start, end)` of `text`, or `None` when the range is out of bounds
pub fn slice(text: &str, start: usize, end: usize) -> Option<&str> {
    if start > end {
        return None;
    }
    let from = byte_index(text, start)?;
    let to = byte_index(text, end)?;
    Some(&text[from..to])
}

/// Owned copy of chars `[start, end)`, clamped to the text
pub(crate) fn substring(text: &str, start: usize, end: usize) -> String {
    text.chars()
        .skip(start)
        .take(end.saturating_sub(start))
        .collect()
}

/// Replace chars `[start, end)` of `text` with `replacement`
pub fn splice(text: &str, start: usize, end: usize, replacement: &str) -> Option<String> {
    let from = byte_index(text, start)?;
    let to = byte_index(text, end)?;
    if from > to {
        return None;
    }
    let mut out = String::with_capacity(text.len() - (to - from) + replacement.len());
    out.push_str(&text[..from]);
    out.push_str(replacement);
    out.push_str(&text[to..]);
    Some(out)
}

/// Zero-based line number containing char `offset`
pub fn line_of_offset(text: &str, offset: usize) -> usize {
    text.chars().take(offset).filter(|c| *c == '\n').count()
}
