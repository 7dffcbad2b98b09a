//! Utility functions and helpers

pub mod time;

/// Convert bytes to a hexadecimal string
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// True for module ids that are already hex encoded.
///
/// Breakpad module ids are 33 or more hex digits (the build id followed by
/// an age field); those must not be encoded a second time.
pub fn is_hex_module_id(id: &[u8]) -> bool {
    id.len() >= 33 && id.iter().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_hex() {
        assert_eq!(bytes_to_hex(&[0xde, 0xad, 0xbe, 0xef]), "deadbeef");
        assert_eq!(bytes_to_hex(b"[build id]"), "5b6275696c642069645d");
    }

    #[test]
    fn test_is_hex_module_id() {
        assert!(is_hex_module_id(b"0123456789abcdef0123456789ABCDEF0"));
        assert!(!is_hex_module_id(b"0123456789abcdef"));
        assert!(!is_hex_module_id(b"0123456789abcdef0123456789abcdefg"));
    }
}
