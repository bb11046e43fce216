//! IPv4 subnet arithmetic shared by the allocation engine, the config loader
//! and the CLI.

use std::net::Ipv4Addr;

/// Total width of an IPv4 address in bits
pub const ADDRESS_BITS: u32 = 32;

/// Build a mask with the low `depth` host bits set
pub fn host_mask(depth: u32) -> u32 {
    if depth >= ADDRESS_BITS {
        u32::MAX
    } else {
        (1u32 << depth) - 1
    }
}

/// Convert 4 raw bytes to an integer, `bytes[0]` most significant
pub fn ipv4_to_u32(bytes: [u8; 4]) -> u32 {
    u32::from_be_bytes(bytes)
}

/// Convert an integer back to 4 raw bytes, most significant first
pub fn u32_to_ipv4(value: u32) -> [u8; 4] {
    value.to_be_bytes()
}

/// Check whether `address` shares the network bits of `base` for a subnet
/// with `depth` host bits
///
/// # Examples
/// ```
/// use trielease::utils::ip_utils::in_subnet;
///
/// assert!(in_subnet([192, 168, 1, 77], [192, 168, 1, 0], 8));
/// assert!(!in_subnet([192, 168, 2, 77], [192, 168, 1, 0], 8));
/// ```
pub fn in_subnet(address: [u8; 4], base: [u8; 4], depth: u32) -> bool {
    let network_mask = !host_mask(depth);
    (ipv4_to_u32(address) & network_mask) == (ipv4_to_u32(base) & network_mask)
}

/// Parse an IPv4 address string into raw bytes
pub fn parse_ipv4(ip: &str) -> Result<[u8; 4], String> {
    ip.trim()
        .parse::<Ipv4Addr>()
        .map(|addr| addr.octets())
        .map_err(|_| format!("Invalid IPv4 address '{}'", ip))
}

/// Parse CIDR notation (e.g. "192.168.1.0/24") into base bytes and prefix length
///
/// # Returns
/// * `Ok(([u8; 4], u32))` - The base network bytes and the prefix length
/// * `Err(String)` - An error message if parsing fails
pub fn parse_cidr(cidr: &str) -> Result<([u8; 4], u32), String> {
    let (ip, prefix) = cidr
        .trim()
        .split_once('/')
        .ok_or_else(|| format!("Subnet '{}' is missing a '/prefix' suffix", cidr))?;

    let base = parse_ipv4(ip)?;
    let prefix = prefix
        .parse::<u32>()
        .map_err(|_| format!("Invalid prefix length '{}' in subnet '{}'", prefix, cidr))?;

    if prefix > ADDRESS_BITS {
        return Err(format!("Prefix length {} exceeds {} bits", prefix, ADDRESS_BITS));
    }

    Ok((base, prefix))
}

/// Format raw bytes as dotted-quad notation
pub fn format_ipv4(bytes: [u8; 4]) -> String {
    Ipv4Addr::from(bytes).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_mask() {
        assert_eq!(host_mask(2), 0b11);
        assert_eq!(host_mask(8), 0xff);
        assert_eq!(host_mask(30), 0x3fff_ffff);
        assert_eq!(host_mask(32), u32::MAX);
    }

    #[test]
    fn test_byte_order() {
        assert_eq!(ipv4_to_u32([192, 168, 1, 2]), 0xc0a8_0102);
        assert_eq!(u32_to_ipv4(0xc0a8_0102), [192, 168, 1, 2]);
        assert_eq!(ipv4_to_u32([0, 0, 0, 1]), 1);
    }

    #[test]
    fn test_in_subnet() {
        let base = [10, 0, 0, 0];
        assert!(in_subnet([10, 0, 0, 3], base, 2));
        assert!(!in_subnet([10, 0, 0, 4], base, 2));
        // Host bits of the base are ignored
        assert!(in_subnet([10, 0, 0, 1], [10, 0, 0, 2], 2));
        assert!(in_subnet([10, 255, 1, 1], base, 24));
        assert!(!in_subnet([11, 0, 0, 0], base, 24));
    }

    #[test]
    fn test_parse_cidr() {
        assert_eq!(parse_cidr("192.168.1.0/24"), Ok(([192, 168, 1, 0], 24)));
        assert_eq!(parse_cidr(" 10.0.0.0/8 "), Ok(([10, 0, 0, 0], 8)));
        assert!(parse_cidr("192.168.1.0").is_err());
        assert!(parse_cidr("192.168.1/24").is_err());
        assert!(parse_cidr("192.168.1.0/x").is_err());
        assert!(parse_cidr("192.168.1.0/33").is_err());
    }

    #[test]
    fn test_format_ipv4() {
        assert_eq!(format_ipv4([192, 168, 1, 1]), "192.168.1.1");
        assert_eq!(parse_ipv4("172.16.0.9"), Ok([172, 16, 0, 9]));
        assert!(parse_ipv4("300.1.1.1").is_err());
    }
}
