/// Splits a whitespace separated list, skipping empty items.
pub fn split_tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
}

/// Trims the value and turns an empty result into `None`.
pub fn fix_empty_and_trim(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

pub fn format_space_delimited<T: AsRef<str>>(items: impl IntoIterator<Item = T>) -> String {
    let mut result = String::new();
    for item in items {
        if !result.is_empty() {
            result.push(' ');
        }
        result.push_str(item.as_ref());
    }
    result
}

/// Pushes `value` unless it is already present, keeping the first-seen order.
pub fn push_unique<T: PartialEq>(items: &mut Vec<T>, value: T) -> bool {
    if items.contains(&value) {
        false
    } else {
        items.push(value);
        true
    }
}
