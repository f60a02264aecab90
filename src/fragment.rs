//! HTML fragment splitting.
//!
//! The `/messages` endpoint answers with a bare fragment: one top-level
//! element per message. This module finds those top-level elements and
//! keeps their exact outer markup so a view can hold them verbatim.
//! Text between top-level elements is dropped, matching what a DOM
//! `children` collection would expose.
//!
//! Of the implicit end tags an HTML parser infers, only the same-name
//! sibling case of `p` and `li` is honoured; other optional end tags are
//! treated as still open.

use thiserror::Error;

/// Malformed fragment markup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FragmentError {
    #[error("unclosed HTML comment at byte {0}")]
    UnclosedComment(usize),

    #[error("unclosed tag <{tag}> at byte {at}")]
    UnclosedTag { tag: String, at: usize },

    #[error("empty tag name at byte {0}")]
    EmptyTagName(usize),

    #[error("unterminated <{0}> element")]
    UnterminatedRawText(String),
}

/// One top-level element of a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageNode {
    tag: String,
    html: String,
}

impl MessageNode {
    /// Lowercase tag name of the element.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Outer markup, byte-for-byte as the server sent it.
    pub fn html(&self) -> &str {
        &self.html
    }

    /// Text content with tags stripped, the common character references
    /// decoded and runs of whitespace collapsed.
    pub fn text(&self) -> String {
        let bytes = self.html.as_bytes();
        let mut raw = String::with_capacity(self.html.len());
        let mut i = 0usize;
        let mut text_start = 0usize;

        while i < bytes.len() {
            if bytes[i] != b'<' || !starts_markup(bytes, i) {
                i += 1;
                continue;
            }
            raw.push_str(&self.html[text_start..i]);
            raw.push(' ');
            i = if starts_with_at(bytes, i, b"<!--") {
                find_subslice(bytes, i + 4, b"-->").map_or(bytes.len(), |end| end + 3)
            } else {
                find_tag_end(bytes, i + 1).map_or(bytes.len(), |gt| gt + 1)
            };
            text_start = i;
        }
        if text_start < bytes.len() {
            raw.push_str(&self.html[text_start..]);
        }

        decode_character_references(&raw)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Split `html` into its top-level elements, in document order.
pub fn parse_fragment(html: &str) -> Result<Vec<MessageNode>, FragmentError> {
    let bytes = html.as_bytes();
    let mut nodes = Vec::new();
    let mut open: Vec<String> = Vec::new();
    let mut element_start = 0usize;
    let mut element_tag = String::new();
    let mut i = 0usize;

    while i < bytes.len() {
        if starts_with_at(bytes, i, b"<!--") {
            let end = find_subslice(bytes, i + 4, b"-->")
                .ok_or(FragmentError::UnclosedComment(i))?;
            i = end + 3;
            continue;
        }

        if bytes[i] != b'<' {
            i += 1;
            continue;
        }

        if starts_with_at(bytes, i, b"</") {
            let (tag, next) = parse_end_tag(html, i)?;
            // Stray end tags with no open match are ignored.
            if let Some(pos) = open.iter().rposition(|t| t.eq_ignore_ascii_case(&tag)) {
                open.truncate(pos);
                if open.is_empty() {
                    nodes.push(MessageNode {
                        tag: std::mem::take(&mut element_tag),
                        html: html[element_start..next].to_string(),
                    });
                }
            }
            i = next;
            continue;
        }

        if starts_with_at(bytes, i, b"<!") || starts_with_at(bytes, i, b"<?") {
            let gt = find_tag_end(bytes, i + 2).ok_or_else(|| FragmentError::UnclosedTag {
                tag: "!".into(),
                at: i,
            })?;
            i = gt + 1;
            continue;
        }

        if !starts_markup(bytes, i) {
            // A literal '<' in text.
            i += 1;
            continue;
        }

        let (tag, self_closing, mut next) = parse_start_tag(html, i)?;

        // `<p>a<p>b` is two paragraphs, as is `<li>a<li>b` inside a list.
        if closes_previous_sibling(&tag) && open.last().is_some_and(|t| *t == tag) {
            open.pop();
            if open.is_empty() {
                nodes.push(MessageNode {
                    tag: std::mem::take(&mut element_tag),
                    html: html[element_start..i].trim_end().to_string(),
                });
            }
        }

        if open.is_empty() {
            element_start = i;
            element_tag.clone_from(&tag);
        }

        let complete = if is_raw_text_tag(&tag) && !self_closing {
            let close = find_case_insensitive_end_tag(bytes, next, tag.as_bytes())
                .ok_or_else(|| FragmentError::UnterminatedRawText(tag.clone()))?;
            let (_, after) = parse_end_tag(html, close)?;
            next = after;
            true
        } else {
            self_closing || is_void_tag(&tag)
        };

        if !complete {
            open.push(tag);
        } else if open.is_empty() {
            nodes.push(MessageNode {
                tag: std::mem::take(&mut element_tag),
                html: html[element_start..next].to_string(),
            });
        }
        i = next;
    }

    // Elements left open run to the end of the fragment.
    if !open.is_empty() {
        nodes.push(MessageNode {
            tag: element_tag,
            html: html[element_start..].trim_end().to_string(),
        });
    }

    Ok(nodes)
}

/// Escape text for inclusion in element content or a quoted attribute.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn parse_start_tag(html: &str, at: usize) -> Result<(String, bool, usize), FragmentError> {
    let bytes = html.as_bytes();
    let tag_start = at + 1;
    let mut i = tag_start;
    while i < bytes.len() && is_tag_char(bytes[i]) {
        i += 1;
    }
    let tag = html[tag_start..i].to_ascii_lowercase();
    if tag.is_empty() {
        return Err(FragmentError::EmptyTagName(at));
    }

    let gt = find_tag_end(bytes, i).ok_or_else(|| FragmentError::UnclosedTag {
        tag: tag.clone(),
        at,
    })?;
    let self_closing = gt > i && bytes[gt - 1] == b'/';
    Ok((tag, self_closing, gt + 1))
}

fn parse_end_tag(html: &str, at: usize) -> Result<(String, usize), FragmentError> {
    let bytes = html.as_bytes();
    let mut i = at + 2;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    let tag_start = i;
    while i < bytes.len() && is_tag_char(bytes[i]) {
        i += 1;
    }
    let tag = html[tag_start..i].to_ascii_lowercase();
    if tag.is_empty() {
        return Err(FragmentError::EmptyTagName(at));
    }

    let gt = find_subslice(bytes, i, b">").ok_or_else(|| FragmentError::UnclosedTag {
        tag: format!("/{tag}"),
        at,
    })?;
    Ok((tag, gt + 1))
}

/// Index of the `>` that closes the tag whose attributes start at `from`,
/// skipping over quoted attribute values.
fn find_tag_end(bytes: &[u8], from: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (offset, &b) in bytes.get(from..)?.iter().enumerate() {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Some(from + offset),
            None => {}
        }
    }
    None
}

fn find_case_insensitive_end_tag(bytes: &[u8], from: usize, tag: &[u8]) -> Option<usize> {
    let mut i = from;
    while i + 2 + tag.len() <= bytes.len() {
        if bytes[i] == b'<'
            && bytes[i + 1] == b'/'
            && bytes[i + 2..i + 2 + tag.len()].eq_ignore_ascii_case(tag)
        {
            let after = bytes.get(i + 2 + tag.len()).copied();
            if after.is_none_or(|b| b == b'>' || b == b'/' || b.is_ascii_whitespace()) {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

/// Whether the `<` at `at` opens a tag, end tag, comment or declaration
/// rather than being a literal character in text.
fn starts_markup(bytes: &[u8], at: usize) -> bool {
    bytes
        .get(at + 1)
        .is_some_and(|&b| b.is_ascii_alphabetic() || matches!(b, b'/' | b'!' | b'?'))
}

fn closes_previous_sibling(tag: &str) -> bool {
    matches!(tag, "p" | "li")
}

fn starts_with_at(bytes: &[u8], at: usize, needle: &[u8]) -> bool {
    bytes.get(at..).is_some_and(|rest| rest.starts_with(needle))
}

fn find_subslice(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| from + pos)
}

fn is_tag_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':')
}

fn is_void_tag(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "source"
            | "track"
            | "wbr"
    )
}

fn is_raw_text_tag(tag: &str) -> bool {
    matches!(tag, "script" | "style" | "textarea" | "title")
}

fn decode_character_references(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
