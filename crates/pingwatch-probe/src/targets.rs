/// Parse a newline-separated host list. Blank lines are skipped, `#` starts a
/// comment, surrounding whitespace is trimmed. Order and duplicates are kept.
pub fn parse_target_list(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let content = match line.find('#') {
                Some(idx) => &line[..idx],
                None => line,
            };
            let trimmed = content.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}
