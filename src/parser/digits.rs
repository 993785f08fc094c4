/// Value returned for any character that is not a Myanmar digit.
pub const FALLBACK_DIGIT: u32 = 1;

const MYANMAR_DIGITS: [char; 10] = ['၀', '၁', '၂', '၃', '၄', '၅', '၆', '၇', '၈', '၉'];

/// Convert a Myanmar digit (U+1040..U+1049) to its value.
///
/// Unrecognised input maps to [`FALLBACK_DIGIT`] rather than failing, so a
/// malformed verse marker still opens verse 1.
pub fn myanmar_digit(c: char) -> u32 {
    MYANMAR_DIGITS
        .iter()
        .position(|&d| d == c)
        .map_or(FALLBACK_DIGIT, |n| n as u32)
}
