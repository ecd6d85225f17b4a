/// Remove an enclosing markdown code fence from an LM response.
///
/// When `text` starts with "```", the first line (fence plus optional language
/// tag) and the last line are dropped; trailing whitespace after the closing
/// fence is ignored. A fenced response with fewer than two lines has no body
/// and yields an empty string. Anything else is returned unchanged.
pub fn strip_fence(text: &str) -> String {
    if !text.starts_with("```") {
        return text.to_string();
    }
    let lines: Vec<&str> = text.trim_end().split('\n').collect();
    if lines.len() < 2 {
        return String::new();
    }
    lines[1..lines.len() - 1].join("\n")
}
