use sha2::Digest;

/// Truncate to at most `max_bytes` without splitting a UTF-8 character.
pub fn truncate_string(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut truncated = String::new();
    for ch in text.chars() {
        if truncated.len() + ch.len_utf8() > max_bytes {
            break;
        }
        truncated.push(ch);
    }
    truncated
}

/// SHA-256 over length-prefixed fields, rendered as lowercase hex.
///
/// Each field is preceded by its byte length so adjacent fields can never be
/// re-split into a colliding input.
pub fn sha256_hex_fields(fields: &[&[u8]]) -> String {
    let mut hasher = sha2::Sha256::new();
    for field in fields {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_string("héllo", 2), "h");
        assert_eq!(truncate_string("short", 64), "short");
    }

    #[test]
    fn field_boundaries_change_the_digest() {
        let joined = sha256_hex_fields(&[b"go", b"X"]);
        let shifted = sha256_hex_fields(&[b"g", b"oX"]);
        assert_ne!(joined, shifted);
        assert_eq!(joined.len(), 64);
    }
}
