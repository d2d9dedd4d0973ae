//! Parsing of the `d` memory dump.
//!
//! Each line starts with an address, followed by up to 16 byte values and an optional
//! ASCII column:
//!
//! ```text
//! 00001000 4E 75 00 00 12 34 56 78  9A BC DE F0 11 22 33 44  Nu...4Vx.....3D
//! ```

/// Maximum number of byte values on one dump line.
pub const BYTES_PER_LINE: usize = 16;

fn is_hex(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Values after this many bytes may be separated by a wider gap.
const GROUP_SIZE: usize = 8;

fn is_gap(c: char) -> bool {
    c.is_ascii_whitespace()
}

/// Decodes the byte values of one dump line, or `None` if it is not a dump line.
///
/// The ASCII column is separated from the values by at least two spaces. Only the gap in
/// the middle of a full line is that wide as well.
fn parse_line(line: &str) -> Option<Vec<u8>> {
    let line = line.trim();
    let (address, mut rest) = match line.find(is_gap) {
        Some(end) => line.split_at(end),
        None => (line, ""),
    };

    let address = address.strip_suffix(':').unwrap_or(address);
    if !is_hex(address) || address.len() < 4 {
        return None;
    }

    let mut bytes = Vec::with_capacity(BYTES_PER_LINE);
    while bytes.len() < BYTES_PER_LINE {
        let value = rest.trim_start_matches(is_gap);
        let gap = rest.len() - value.len();
        if gap >= 2 && !bytes.is_empty() && bytes.len() != GROUP_SIZE {
            break;
        }

        let end = value.find(is_gap).unwrap_or(value.len());
        let token = &value[..end];
        if token.len() != 2 || !is_hex(token) {
            break;
        }
        bytes.push(u8::from_str_radix(token, 16).ok()?);
        rest = &value[end..];
    }

    Some(bytes)
}

/// Collects the byte values of a memory dump in order.
///
/// Lines that do not start with an address, such as the echoed command, are ignored.
pub fn parse_memory_dump(text: &str) -> Vec<u8> {
    text.lines().filter_map(parse_line).flatten().collect()
}
