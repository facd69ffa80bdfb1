//! Caption/markup construction (§9 design notes): centralizes HTML escaping
//! and the media-group chunking rule so every resolver/driver path builds
//! captions the same way, instead of each call site repeating it.
//!
//! Chunking rule grounded on `generic_handler.py`'s media-group loop: items
//! are sent in batches of at most 10, and the caption is attached only to
//! the first item of the first batch.

pub const MEDIA_GROUP_CHUNK_SIZE: usize = 10;

/// Escape text for Telegram's `HTML` parse mode (the only `&`, `<`, `>` need
/// escaping inside a plain caption — no attribute contexts to worry about).
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

/// Split `items` into chunks of at most [`MEDIA_GROUP_CHUNK_SIZE`], returning
/// the caption to attach to each chunk — `Some(caption)` only for index 0 of
/// chunk 0, `None` everywhere else.
pub fn chunk_media_group<T: Clone>(items: &[T], caption: &str) -> Vec<(Vec<T>, Option<String>)> {
    items
        .chunks(MEDIA_GROUP_CHUNK_SIZE)
        .enumerate()
        .map(|(i, chunk)| {
            let cap = if i == 0 { Some(caption.to_string()) } else { None };
            (chunk.to_vec(), cap)
        })
        .collect()
}

/// Append the optional `LESS_FLAG` trailer line (§10.5) to a caption, if configured.
pub fn with_less_flag(caption: &str, less_flag: Option<&str>) -> String {
    match less_flag {
        Some(flag) if !flag.is_empty() => format!("{caption}\n{flag}"),
        _ => caption.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_ampersand_and_angle_brackets() {
        assert_eq!(escape_html("A & B <tag>"), "A &amp; B &lt;tag&gt;");
    }

    #[test]
    fn leaves_plain_text_untouched() {
        assert_eq!(escape_html("hello world"), "hello world");
    }

    #[test]
    fn chunk_media_group_only_first_item_gets_caption() {
        let items: Vec<i32> = (0..25).collect();
        let chunks = chunk_media_group(&items, "title");
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].0.len(), 10);
        assert_eq!(chunks[1].0.len(), 10);
        assert_eq!(chunks[2].0.len(), 5);
        assert_eq!(chunks[0].1.as_deref(), Some("title"));
        assert_eq!(chunks[1].1, None);
        assert_eq!(chunks[2].1, None);
    }

    #[test]
    fn less_flag_appends_only_when_present() {
        assert_eq!(with_less_flag("caption", Some("via bot")), "caption\nvia bot");
        assert_eq!(with_less_flag("caption", None), "caption");
        assert_eq!(with_less_flag("caption", Some("")), "caption");
    }
}
