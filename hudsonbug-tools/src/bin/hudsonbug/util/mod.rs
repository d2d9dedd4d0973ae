pub mod common_options;
pub mod logging;
pub mod upload;

use std::num::ParseIntError;

/// Parses a number in decimal (16), hexadecimal (0x10) or octal (0o20) notation.
pub fn parse_u32(input: &str) -> Result<u32, ParseIntError> {
    parse_int::parse(input)
}

/// Parses a hexadecimal number, with or without a `0x` prefix.
///
/// The monitor talks hex exclusively, so bare numbers are hex too.
pub fn parse_hex_u32(input: &str) -> Result<u32, ParseIntError> {
    let digits = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);

    // `from_str_radix` takes a leading `+`, which the monitor would not.
    if digits.starts_with('+') {
        return u32::from_str_radix("+", 16);
    }
    u32::from_str_radix(digits, 16)
}
