use num::Integer;

/// Number of bytes needed to hold `bits` bits
pub(crate) fn bitstring_buffer_size(bits: usize) -> usize {
    Integer::div_ceil(&bits, &8usize)
}

/// Number of padding bits that complete `bits` bits to a whole byte
pub(crate) fn bitstring_padding_bits(bits: usize) -> usize {
    (8 - bits % 8) % 8
}

/// Takes the low-order `N` bytes of a hash value
pub(crate) fn low_order_bytes<const N: usize>(hash: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    let start = hash.len().saturating_sub(N);
    out[N - (hash.len() - start)..].copy_from_slice(&hash[start..]);
    out
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_bitstring_sizes() {
        assert_eq!(0, bitstring_buffer_size(0));
        assert_eq!(1, bitstring_buffer_size(1));
        assert_eq!(1, bitstring_buffer_size(8));
        assert_eq!(2, bitstring_buffer_size(9));
        assert_eq!(0, bitstring_padding_bits(8));
        assert_eq!(7, bitstring_padding_bits(1));
        assert_eq!(4, bitstring_padding_bits(12));
    }

    #[test]
    fn takes_low_order_bytes() {
        let sha256_empty =
            hex::decode("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
                .unwrap();
        assert_eq!(
            hex::decode("a495991b7852b855").unwrap(),
            low_order_bytes::<8>(&sha256_empty)
        );
        assert_eq!([0x52, 0xb8, 0x55], low_order_bytes::<3>(&sha256_empty));
        assert_eq!([0, 0, 1, 2], low_order_bytes::<4>(&[1, 2]));
    }
}
