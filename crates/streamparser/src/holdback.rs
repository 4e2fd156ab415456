//! Partial-closing-tag holdback: the load-bearing trick that keeps a
//! streaming parser from leaking a fragment of `</TAG>` as if it were
//! body text, just because the chunk boundary happened to fall in the
//! middle of the tag.

/// The length of the longest proper prefix of `tag` that is also a
/// suffix of `text`. Emitting `text` up to `text.len() - holdback`
/// guarantees no partial closing tag is ever flushed as body content.
pub fn closing_tag_holdback(text: &str, tag: &str) -> usize {
    let max_len = tag.len().saturating_sub(1).min(text.len());
    for len in (1..=max_len).rev() {
        if text.ends_with(&tag[..len]) {
            return len;
        }
    }
    0
}
