//! Guide markdown handling.
//!
//! [`split_guide`] derives a guide's title and body from raw markdown.
//! [`chunk_narration`] splits a body into paragraph-aligned pieces small
//! enough for a single text-to-speech request.

/// Title used when the markdown has no leading `# ` heading.
pub const DEFAULT_TITLE: &str = "Untitled Guide";

/// Split guide markdown into `(title, content)`.
///
/// Leading blank (empty or whitespace-only) lines are skipped. If the
/// first remaining line starts with `# `, the rest of that line is the
/// title and the remainder of the document, trimmed, is the content. Otherwise the title is
/// [`DEFAULT_TITLE`] and the content is the whole input, trimmed.
pub fn split_guide(markdown: &str) -> (String, String) {
    let mut body = markdown;
    while let Some(pos) = body.find('\n') {
        if !body[..pos].trim().is_empty() {
            break;
        }
        body = &body[pos + 1..];
    }
    let (first_line, rest) = match body.find('\n') {
        Some(pos) => (&body[..pos], &body[pos + 1..]),
        None => (body, ""),
    };

    match first_line.strip_prefix("# ") {
        Some(title) => (
            title.strip_suffix('\r').unwrap_or(title).to_string(),
            rest.trim().to_string(),
        ),
        None => (DEFAULT_TITLE.to_string(), markdown.trim().to_string()),
    }
}

/// Split text into narration chunks on paragraph boundaries, each at most
/// `max_chars` characters. Paragraphs longer than the limit are hard-split
/// at the last newline or space before it.
pub fn chunk_narration(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let para_len = trimmed.chars().count();
        let would_be = if current.is_empty() {
            para_len
        } else {
            current.chars().count() + 2 + para_len
        };

        if would_be > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        if para_len > max_chars {
            hard_split(trimmed, max_chars, &mut chunks);
        } else {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(trimmed);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

fn hard_split(paragraph: &str, max_chars: usize, out: &mut Vec<String>) {
    let mut remaining = paragraph;
    while !remaining.is_empty() {
        // Byte offset of the `max_chars`-th character, or the end.
        let limit = remaining
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());

        let split_at = if limit < remaining.len() {
            remaining[..limit]
                .rfind('\n')
                .or_else(|| remaining[..limit].rfind(' '))
                .map(|pos| pos + 1)
                .unwrap_or(limit)
        } else {
            limit
        };

        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        remaining = &remaining[split_at..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_becomes_title() {
        let (title, content) = split_guide("# Museum Tour\n\nWelcome.");
        assert_eq!(title, "Museum Tour");
        assert_eq!(content, "Welcome.");
    }

    #[test]
    fn test_title_kept_verbatim() {
        let (title, content) = split_guide("#  Spaced  Title \nBody text\n\n");
        assert_eq!(title, " Spaced  Title ");
        assert_eq!(content, "Body text");
    }

    #[test]
    fn test_crlf_heading() {
        let (title, content) = split_guide("# Louvre\r\n\r\nMona Lisa.\r\n");
        assert_eq!(title, "Louvre");
        assert_eq!(content, "Mona Lisa.");
    }

    #[test]
    fn test_heading_only() {
        let (title, content) = split_guide("# Only a title");
        assert_eq!(title, "Only a title");
        assert_eq!(content, "");
    }

    #[test]
    fn test_leading_blank_lines_skipped() {
        let (title, content) = split_guide("\n\n# Gallery\nRoom one.");
        assert_eq!(title, "Gallery");
        assert_eq!(content, "Room one.");
    }

    #[test]
    fn test_whitespace_only_lines_skipped() {
        let (title, content) = split_guide("  \n# Gallery\nRoom one.");
        assert_eq!(title, "Gallery");
        assert_eq!(content, "Room one.");

        let (title, _) = split_guide("\t\r\n   \n# Crypt\r\nStairs.");
        assert_eq!(title, "Crypt");
    }

    #[test]
    fn test_blank_only_input() {
        let (title, content) = split_guide(" \n\t\n ");
        assert_eq!(title, DEFAULT_TITLE);
        assert_eq!(content, "");
    }

    #[test]
    fn test_no_heading_defaults() {
        let input = "  Just some text.\n\nMore text.  ";
        let (title, content) = split_guide(input);
        assert_eq!(title, DEFAULT_TITLE);
        assert_eq!(content, input.trim());
    }

    #[test]
    fn test_subheading_is_not_title() {
        let (title, content) = split_guide("## Section\nBody");
        assert_eq!(title, DEFAULT_TITLE);
        assert_eq!(content, "## Section\nBody");
    }

    #[test]
    fn test_later_heading_is_not_title() {
        let (title, content) = split_guide("Intro line\n# Late heading\nBody");
        assert_eq!(title, DEFAULT_TITLE);
        assert_eq!(content, "Intro line\n# Late heading\nBody");
    }

    #[test]
    fn test_hash_without_space_is_not_title() {
        let (title, _) = split_guide("#hashtag\nbody");
        assert_eq!(title, DEFAULT_TITLE);
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_narration("Hello, visitor!", 100);
        assert_eq!(chunks, vec!["Hello, visitor!".to_string()]);
    }

    #[test]
    fn test_paragraphs_grouped_under_limit() {
        let chunks = chunk_narration("aaaa\n\nbbbb\n\ncccc", 10);
        assert_eq!(chunks, vec!["aaaa\n\nbbbb".to_string(), "cccc".to_string()]);
    }

    #[test]
    fn test_long_paragraph_split_on_spaces() {
        let text = "one two three four five six seven";
        let chunks = chunk_narration(text, 10);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 10, "chunk too long: {:?}", c);
        }
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn test_multibyte_text_does_not_panic() {
        let text = "é".repeat(25);
        let chunks = chunk_narration(&text, 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(chunk_narration("  \n\n  ", 50).is_empty());
    }
}
