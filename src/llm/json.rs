//! Pulling a JSON object out of chatty model output.

/// Find the JSON object in a model reply.
///
/// Models wrap answers in markdown fences or prose. The fence (if any) is
/// stripped first, then the first balanced `{..}` span is returned. Braces
/// inside string literals don't count. Without any object the trimmed input
/// comes back unchanged so the JSON parser reports the real problem.
pub fn extract_json_object(text: &str) -> &str {
    let body = strip_fence(text.trim());
    balanced_object(body).unwrap_or(body)
}

/// Contents of the first fenced block, minus its language tag.
fn strip_fence(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let after_ticks = &text[open + 3..];
    // The info string ("json", "JSON", nothing) runs to the end of the line.
    let body_start = after_ticks.find('\n').map_or(0, |i| i + 1);
    let body = &after_ticks[body_start..];
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
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
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}
