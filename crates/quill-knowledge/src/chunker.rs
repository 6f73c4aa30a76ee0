//! Fixed-size text chunking.

/// Split `text` into consecutive, non-overlapping chunks of exactly
/// `chunk_size` characters.
///
/// The trailing remainder shorter than `chunk_size` is dropped. A zero size,
/// or a size longer than the text, yields no chunks.
pub fn chunk(text: &str, chunk_size: usize) -> Vec<String> {
    if chunk_size == 0 {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut len = 0;
    for (offset, ch) in text.char_indices() {
        len += 1;
        if len == chunk_size {
            let end = offset + ch.len_utf8();
            chunks.push(text[start..end].to_string());
            start = end;
            len = 0;
        }
    }
    chunks
}
