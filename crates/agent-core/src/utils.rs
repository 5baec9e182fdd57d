/// Pull the first JSON object out of a model reply.
///
/// Handles bare objects, fenced ```json blocks and objects wrapped in prose.
/// Braces inside string literals do not count towards nesting.
pub fn extract_json_object(raw: &str) -> Option<String> {
    let fence = "```";
    if let Some(start) = raw.find(fence) {
        let after_fence = &raw[start + fence.len()..];
        let after_lang = after_fence.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_');
        if let Some(end) = after_lang.find(fence) {
            if let Some(object) = balanced_object(&after_lang[..end]) {
                return Some(object);
            }
        }
    }
    balanced_object(raw)
}

fn balanced_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let rest = &text[start..];
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in rest.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(rest[..=idx].trim().to_string());
                }
            }
            _ => {}
        }
    }
    None
}
