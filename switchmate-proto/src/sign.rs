//! Command signing
//!
//! The switch firmware authenticates state writes with a 4-byte checksum
//! keyed by the pairing key. It is a string-hash style accumulator, not a MAC,
//! and has to be reproduced bit for bit.

const MULTIPLIER: i64 = 1_000_003;

/// Running checksum over `command ++ key`
struct Checksum {
    x: i64,
    len: i64,
}

impl Checksum {
    fn new(first: u8, len: usize) -> Self {
        Self {
            x: i64::from(first) << 7,
            len: len as i64,
        }
    }

    fn update(&mut self, byte: u8) {
        self.x = MULTIPLIER.wrapping_mul(self.x) ^ i64::from(byte) ^ self.len;
    }

    fn finish(self) -> i64 {
        // -1 is reserved by the hash this was lifted from
        if self.x == -1 { -2 } else { self.x }
    }
}

/// Compute the checksum of `command` followed by `key`.
///
/// An empty input never happens on the wire (commands are never empty) and
/// yields 0.
pub fn sign(command: &[u8], key: &[u8]) -> i64 {
    let mut blob = command.iter().chain(key.iter()).copied();
    let Some(first) = blob.next() else {
        return 0;
    };

    let mut checksum = Checksum::new(first, command.len() + key.len());
    checksum.update(first);
    for byte in blob {
        checksum.update(byte);
    }
    checksum.finish()
}

/// Serialise a checksum into the 4-byte wire field (low 32 bits, little endian)
pub fn signature_bytes(signature: i64) -> [u8; 4] {
    (signature as u32).to_le_bytes()
}

/// Prefix `command` with its signature under `key`
pub fn sign_command(command: &[u8], key: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + command.len());
    buf.extend_from_slice(&signature_bytes(sign(command, key)));
    buf.extend_from_slice(command);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 16] = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
        0x0f,
    ];

    #[test]
    fn known_answers() {
        assert_eq!(sign(&[0x01, 0x01], &KEY), 7_505_315_897_347_338_266);
        assert_eq!(signature_bytes(sign(&[0x01, 0x01], &KEY)), [26, 240, 122, 52]);
        assert_eq!(signature_bytes(sign(&[0x01, 0x00], &KEY)), [107, 243, 235, 48]);
        assert_eq!(
            signature_bytes(sign(&[0x01, 0x01], &[0xde, 0xad, 0xbe, 0xef])),
            [248, 131, 155, 146]
        );
        assert_eq!(signature_bytes(sign(&[0, 0, 0, 0, 1], &[])), [120, 206, 222, 153]);
    }

    #[test]
    fn deterministic() {
        assert_eq!(sign(&[0x01, 0x01], &KEY), sign(&[0x01, 0x01], &KEY));
    }

    #[test]
    fn any_byte_changes_signature() {
        let base = sign(&[0x01, 0x01], &KEY);

        assert_ne!(sign(&[0x01, 0x00], &KEY), base);
        assert_ne!(sign(&[0x02, 0x01], &KEY), base);
        for i in 0..KEY.len() {
            let mut key = KEY;
            key[i] ^= 0x80;
            assert_ne!(sign(&[0x01, 0x01], &key), base, "key byte {i}");
        }
    }

    #[test]
    fn reserved_value_is_substituted() {
        let checksum = Checksum { x: -1, len: 2 };
        let signature = checksum.finish();
        assert_eq!(signature, -2);
        assert_eq!(signature_bytes(signature), [0xfe, 0xff, 0xff, 0xff]);

        let checksum = Checksum { x: -3, len: 2 };
        assert_eq!(checksum.finish(), -3);
    }

    #[test]
    fn multiplication_wraps() {
        // 0xff << 7 times the multiplier overflows well before the last byte
        let long = [0xffu8; 64];
        let _ = sign(&long, &long);
    }

    #[test]
    fn empty_input() {
        assert_eq!(sign(&[], &[]), 0);
    }

    #[test]
    fn signed_command_layout() {
        let signed = sign_command(&[0x01, 0x01], &KEY);
        assert_eq!(signed, vec![26, 240, 122, 52, 0x01, 0x01]);
    }
}
