/// Characters a BPMN display name may contain but a handler identifier may
/// not. Each is replaced by `_`.
const MAPPED_CHARS: &[char] = &[
    ':', '!', '`', '~', '^', '@', '*', '#', '¢', '¬', 'ç', '?', '¦', '|', '&', ';', '%', '"', '<',
    '>', '(', ')', '{', '}', '[', ']', '+', ',', ' ', '\t', '\n',
];

/// Canonical handler identifier for a BPMN display name. Applied at both
/// registration and lookup, so `"Approve Order"` and `Approve_Order` resolve
/// to the same handler.
pub fn canonical_handler_name(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| if MAPPED_CHARS.contains(&c) { '_' } else { c })
        .collect();
    match mapped.chars().next() {
        Some(first) if first.is_ascii_digit() => format!("_{}", mapped),
        _ => mapped,
    }
}

#[cfg(test)]
mod tests {
    use super::canonical_handler_name;

    #[test]
    fn maps_punctuation_and_whitespace() {
        assert_eq!(canonical_handler_name("Approve Order"), "Approve_Order");
        assert_eq!(canonical_handler_name("a:b!c?d"), "a_b_c_d");
        assert_eq!(canonical_handler_name("x(y)[z]{w}"), "x_y__z__w_");
        assert_eq!(canonical_handler_name("a\tb\nc"), "a_b_c");
    }

    #[test]
    fn digit_prefix() {
        assert_eq!(canonical_handler_name("1st step"), "_1st_step");
        assert_eq!(canonical_handler_name("step 1"), "step_1");
    }

    #[test]
    fn dollar_suffixes_survive() {
        assert_eq!(
            canonical_handler_name("My Timer$getTimeout"),
            "My_Timer$getTimeout"
        );
    }
}
