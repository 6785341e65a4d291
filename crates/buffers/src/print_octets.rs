//! Hex formatting for byte previews and dump rows.

use std::fmt::Write as _;

/// Formats at most `max` bytes as space-separated lowercase hex.
///
/// Bytes past `max` are summarised as `... (N more)`.
///
/// # Example
///
/// ```
/// use nethook_buffers::print_octets;
///
/// assert_eq!(print_octets(&[0x01, 0x02, 0x0a, 0xff], 16), "01 02 0a ff");
/// assert_eq!(print_octets(&[0x01, 0x02, 0x03], 1), "01... (2 more)");
/// assert_eq!(print_octets(&[], 16), "");
/// ```
pub fn print_octets(octets: &[u8], max: usize) -> String {
    let mut result = String::with_capacity(octets.len().min(max) * 3 + 16);
    for (i, byte) in octets.iter().take(max).enumerate() {
        if i > 0 {
            result.push(' ');
        }
        let _ = write!(result, "{byte:02x}");
    }

    if octets.len() > max {
        let _ = write!(result, "... ({} more)", octets.len() - max);
    }

    result
}

/// Formats a byte slice as a hex string with default max of 16 bytes.
///
/// # Example
///
/// ```
/// use nethook_buffers::print_octets_default;
///
/// assert_eq!(print_octets_default(&[0x01, 0x02]), "01 02");
/// ```
pub fn print_octets_default(octets: &[u8]) -> String {
    print_octets(octets, 16)
}
