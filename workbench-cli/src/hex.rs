//! Hex and address text encodings.

use std::str::FromStr;

use solana_sdk::pubkey::Pubkey;

pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn hex_decode(hex: &str) -> Result<Vec<u8>, String> {
    if hex.len() % 2 != 0 {
        return Err(format!("Hex string has odd length: {}", hex.len()));
    }
    if !hex.is_ascii() {
        return Err("Hex string contains non-ASCII characters".to_string());
    }
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    for i in (0..hex.len()).step_by(2) {
        let byte = u8::from_str_radix(&hex[i..i + 2], 16)
            .map_err(|e| format!("Invalid hex at position {}: {}", i, e))?;
        bytes.push(byte);
    }
    Ok(bytes)
}

pub fn strip_hex_prefix(s: &str) -> Option<&str> {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))
}

/// Parse an address from base58, or from `0x`-prefixed hex (64 digits).
pub fn parse_address(input: &str) -> Result<Pubkey, String> {
    let input = input.trim();
    if let Some(hex) = strip_hex_prefix(input) {
        let bytes = hex_decode(hex)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| format!("Expected 32 bytes, got {}", bytes.len()))?;
        return Ok(Pubkey::new_from_array(arr));
    }
    Pubkey::from_str(input).map_err(|e| format!("'{}' is not a valid base58 address: {}", input, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trips_known_bytes() {
        assert_eq!(hex_encode(&[0xde, 0xad, 0x01]), "dead01");
        assert_eq!(hex_decode("dead01").unwrap(), vec![0xde, 0xad, 0x01]);
        assert!(hex_decode("abc").is_err());
    }

    #[test]
    fn parses_base58_and_prefixed_hex() {
        let system = parse_address("11111111111111111111111111111111").unwrap();
        assert_eq!(system, Pubkey::default());

        let hex = format!("0x{}", "01".repeat(32));
        assert_eq!(parse_address(&hex).unwrap(), Pubkey::new_from_array([1u8; 32]));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(parse_address("not-an-address").is_err());
        assert!(parse_address("0x0102").is_err());
        assert!(parse_address("").is_err());
    }
}
