//! Record normalisation and chunking.
//!
//! A record is a single UTF-8 line. Before a record is stored or transmitted
//! its trailing line terminators are stripped (the transport adds exactly one
//! back) and any embedded `\n` is replaced with [`LINE_SEPARATOR`], keeping
//! every record on one physical line. The substitution is reversible with
//! [`restore_newlines`].

use std::borrow::Cow;

/// Maximum length, in bytes, of a single queued record.
pub const MAX_RECORD_LEN: usize = 65_536;

/// Code point substituted for embedded newlines (U+2028 LINE SEPARATOR).
pub const LINE_SEPARATOR: char = '\u{2028}';

/// Strip trailing line terminators and replace embedded newlines.
///
/// Borrows when the record is already clean.
///
/// # Examples
///
/// ```
/// use femtoship::record::sanitize;
///
/// assert_eq!(sanitize("one\ntwo\r\n"), "one\u{2028}two");
/// assert_eq!(sanitize("plain"), "plain");
/// ```
pub fn sanitize(record: &str) -> Cow<'_, str> {
    let trimmed = record.trim_end_matches(['\r', '\n']);
    if trimmed.contains('\n') {
        Cow::Owned(trimmed.replace('\n', "\u{2028}"))
    } else {
        Cow::Borrowed(trimmed)
    }
}

/// Undo the newline substitution performed by [`sanitize`].
pub fn restore_newlines(line: &str) -> Cow<'_, str> {
    if line.contains(LINE_SEPARATOR) {
        Cow::Owned(line.replace(LINE_SEPARATOR, "\n"))
    } else {
        Cow::Borrowed(line)
    }
}

/// Split `source` into ordered, contiguous chunks of at most `limit` bytes.
///
/// Every chunk is a valid `&str`, so cuts land on the largest UTF-8 character
/// boundary not exceeding the limit rather than at an exact byte offset. This
/// is the only departure from a plain byte split: when a multi-byte character
/// straddles a cut, that chunk falls up to three bytes short of `limit` and the
/// record may need more chunks than `ceil(len / limit)`. For single-byte text
/// the count is exactly `ceil(len / limit)`. Concatenating the chunks always
/// reproduces `source`. A `limit` of zero yields the input unsplit.
///
/// # Examples
///
/// ```
/// use femtoship::record::split_into_chunks;
///
/// let chunks: Vec<_> = split_into_chunks("abcdefg", 3).collect();
/// assert_eq!(chunks, ["abc", "def", "g"]);
/// ```
pub fn split_into_chunks(source: &str, limit: usize) -> Chunks<'_> {
    Chunks {
        rest: source,
        limit,
        done: false,
    }
}

/// Iterator returned by [`split_into_chunks`].
#[derive(Clone, Debug)]
pub struct Chunks<'a> {
    rest: &'a str,
    limit: usize,
    done: bool,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.limit == 0 || self.rest.len() <= self.limit {
            self.done = true;
            return Some(self.rest);
        }
        let mut cut = self.limit;
        while !self.rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            // A single character wider than the limit; emit it whole.
            cut = self.rest.chars().next().map_or(self.rest.len(), char::len_utf8);
        }
        let (head, tail) = self.rest.split_at(cut);
        self.rest = tail;
        Some(head)
    }
}
