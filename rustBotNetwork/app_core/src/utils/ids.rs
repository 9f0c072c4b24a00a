use rand::RngCore;

/// Generates an opaque, stable 128-bit identifier formatted as a
/// UUID-v4-shaped hex string (8-4-4-4-12). Not cryptographically validated as
/// a UUID — just a convenient fixed-width textual encoding of 16 random
/// bytes, since the crate has no dependency on a dedicated UUID type.
pub fn new_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    // RFC 4122 version/variant bits, purely cosmetic here.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_id_has_expected_shape() {
        let id = new_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts.iter().map(|p| p.len()).collect::<Vec<_>>(), vec![8, 4, 4, 4, 12]);
    }

    #[test]
    fn new_id_is_not_trivially_repeated() {
        let a = new_id();
        let b = new_id();
        assert_ne!(a, b);
    }
}
