//! Byte-order aware decoding of fixed-width values from a byte buffer.

use smallvec::SmallVec;

/// Byte order of a multi-byte read.
///
/// `Middle` is the PDP-11 order for 4-byte words: two 16-bit little-endian
/// halves stored most-significant half first, so `[1, 2, 3, 4]` decodes to
/// `0x0201_0403`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Little,
    Big,
    Middle,
    Native,
}

/// Bytes of an encoded value in buffer order, at most 8 wide.
pub(crate) type EncodedBytes = SmallVec<[u8; 8]>;

impl ByteOrder {
    #[cfg(target_endian = "little")]
    pub(crate) fn resolve(self) -> Self {
        match self {
            Self::Native => Self::Little,
            other => other,
        }
    }

    #[cfg(target_endian = "big")]
    pub(crate) fn resolve(self) -> Self {
        match self {
            Self::Native => Self::Big,
            other => other,
        }
    }

    /// Order with little and big swapped, used by `use ^name` invocations.
    pub(crate) fn invert(self) -> Self {
        match self.resolve() {
            Self::Little => Self::Big,
            Self::Big => Self::Little,
            other => other,
        }
    }

    /// Copy `width` bytes at `offset` reordered most-significant first.
    /// `None` if the read leaves the buffer or the order does not support
    /// the width (`Middle` is 4-byte only).
    fn read_msb_first(self, buf: &[u8], offset: usize, width: usize) -> Option<EncodedBytes> {
        let raw = buf.get(offset..offset.checked_add(width)?)?;
        let mut out = EncodedBytes::new();
        match self.resolve() {
            Self::Big => out.extend_from_slice(raw),
            Self::Little => out.extend(raw.iter().rev().copied()),
            Self::Middle => {
                if width != 4 {
                    return None;
                }
                out.extend_from_slice(&[raw[1], raw[0], raw[3], raw[2]]);
            }
            Self::Native => unreachable!("resolved above"),
        }
        Some(out)
    }

    /// Decode an unsigned integer of `width` bytes (1, 2, 4 or 8).
    pub fn decode_uint(self, buf: &[u8], offset: usize, width: usize) -> Option<u64> {
        let bytes = self.read_msb_first(buf, offset, width)?;
        Some(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
    }

    /// Decode a signed integer of `width` bytes, sign-extended to 64 bits.
    pub fn decode_int(self, buf: &[u8], offset: usize, width: usize) -> Option<i64> {
        let v = self.decode_uint(buf, offset, width)?;
        let shift = 64 - 8 * width as u32;
        Some(((v << shift) as i64) >> shift)
    }

    /// Decode a 4-byte ID3 length: each byte contributes its low 7 bits,
    /// bytes taken in this order's sequence.
    pub fn decode_id3(self, buf: &[u8], offset: usize) -> Option<u64> {
        let bytes = self.read_msb_first(buf, offset, 4)?;
        Some(
            bytes
                .iter()
                .fold(0u64, |acc, &b| (acc << 7) | u64::from(b & 0x7f)),
        )
    }

    /// Decode an IEEE float from the 4-byte integer bit pattern.
    pub fn decode_f32(self, buf: &[u8], offset: usize) -> Option<f32> {
        self.decode_uint(buf, offset, 4)
            .map(|v| f32::from_bits(v as u32))
    }

    /// Decode an IEEE double from the 8-byte integer bit pattern.
    pub fn decode_f64(self, buf: &[u8], offset: usize) -> Option<f64> {
        self.decode_uint(buf, offset, 8).map(f64::from_bits)
    }

    /// Encode the low `width` bytes of `value` in buffer order. Inverse of
    /// `decode_uint`, used to seed the first-byte index.
    pub(crate) fn encode(self, value: u64, width: usize) -> Option<EncodedBytes> {
        let mut msb_first = EncodedBytes::new();
        for i in (0..width).rev() {
            msb_first.push((value >> (8 * i)) as u8);
        }
        match self.resolve() {
            Self::Big => Some(msb_first),
            Self::Little => Some(msb_first.iter().rev().copied().collect()),
            Self::Middle => {
                if width != 4 {
                    return None;
                }
                Some(EncodedBytes::from_slice(&[
                    msb_first[1],
                    msb_first[0],
                    msb_first[3],
                    msb_first[2],
                ]))
            }
            Self::Native => unreachable!("resolved above"),
        }
    }
}

#[cfg(test)]
mod tests;
