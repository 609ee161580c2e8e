//! Tape encoding for machine operands and outputs.
//!
//! Every number on a tape is stored least-significant-digit-first, so the
//! machines read digits in the order positional arithmetic consumes them.
//! Rendering prefixes each digit with a separator (`|4|0|5|1` for 1504); an
//! empty digit string renders as the empty string, never a placeholder.

/// Separator written before every digit in a rendered tape.
pub const SEPARATOR: char = '|';

/// Encode a value as its decimal digits in tape order (reversed).
pub fn encode(value: u128) -> String {
    value.to_string().chars().rev().collect()
}

/// Decode a tape-order digit string back into a value.
///
/// Returns `None` for empty input, non-digit characters, or values beyond
/// `u128` (wide enough for every reachable intermediate, including the
/// 20-digit all-nines masks subtraction feeds through addition). Leading
/// zeros collapse, so a decode/encode round trip canonicalizes the tape.
pub fn decode(digits: &str) -> Option<u128> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let conventional: String = digits.chars().rev().collect();
    conventional.parse().ok()
}

/// Render a digit string with a separator before each digit.
pub fn render(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() * 2);
    for c in digits.chars() {
        out.push(SEPARATOR);
        out.push(c);
    }
    out
}

/// Render a digit string split at a head position.
///
/// The left half holds the digits already consumed, the right half the digit
/// under the head and everything after it. The split index is clamped to the
/// string length, and each half is rendered independently.
pub fn render_split(digits: &str, head: usize) -> (String, String) {
    let at = head.min(digits.len());
    (render(&digits[..at]), render(&digits[at..]))
}

/// Strip separators from a rendered field and restore conventional digit
/// order.
pub fn unrender(field: &str) -> String {
    field
        .chars()
        .filter(|&c| c != SEPARATOR)
        .rev()
        .collect()
}

/// Digit value at a tape position, or 0 once the head has run off the end.
pub fn digit_or_zero(digits: &str, pos: usize) -> u32 {
    digits
        .as_bytes()
        .get(pos)
        .map(|b| (b - b'0') as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_reverses_digits() {
        assert_eq!(encode(1504), "4051");
        assert_eq!(encode(5), "5");
        assert_eq!(encode(0), "0");
    }

    #[test]
    fn test_decode_round_trip() {
        assert_eq!(decode(&encode(345)), Some(345));
        assert_eq!(decode("4051"), Some(1504));
    }

    #[test]
    fn test_decode_collapses_leading_zeros() {
        // Tape "100" reads as 001, i.e. the value 1.
        assert_eq!(decode("100"), Some(1));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(decode(""), None);
        assert_eq!(decode("12a"), None);
        assert_eq!(decode(&"9".repeat(40)), None);
    }

    #[test]
    fn test_render_prefixes_each_digit() {
        assert_eq!(render("4051"), "|4|0|5|1");
        assert_eq!(render("5"), "|5");
        assert_eq!(render(""), "");
    }

    #[test]
    fn test_render_split_clamps_head() {
        assert_eq!(render_split("543", 1), ("|5".to_string(), "|4|3".to_string()));
        assert_eq!(render_split("543", 0), (String::new(), "|5|4|3".to_string()));
        assert_eq!(render_split("543", 7), ("|5|4|3".to_string(), String::new()));
    }

    #[test]
    fn test_unrender_restores_notation() {
        assert_eq!(unrender("|4|0|5|1"), "1504");
        assert_eq!(unrender("|3"), "3");
    }

    #[test]
    fn test_digit_or_zero_past_end() {
        assert_eq!(digit_or_zero("543", 0), 5);
        assert_eq!(digit_or_zero("543", 2), 3);
        assert_eq!(digit_or_zero("543", 3), 0);
    }
}
