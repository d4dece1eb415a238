//! Bounds-checked cursor over a received payload.

/// Errors produced while decoding a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("truncated message: needed {needed} bytes but only {available} remain")]
    TruncatedMessage { needed: usize, available: usize },
}

/// Little-endian reader that refuses to run past the end of its buffer.
///
/// A failed read leaves the cursor untouched, so callers can report the
/// position at which decoding stopped.
#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Starts reading at `pos`, clamped to the buffer length.
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self {
            data,
            pos: pos.min(data.len()),
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        let [byte] = self.read_array::<1>()?;
        Ok(byte)
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        self.read_array().map(u16::from_le_bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        self.read_array().map(u32::from_le_bytes)
    }

    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        self.read_array().map(f32::from_le_bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let available = self.remaining();
        if available < N {
            return Err(CodecError::TruncatedMessage {
                needed: N,
                available,
            });
        }

        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_little_endian() {
        let data = [0x01, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
        let mut reader = ByteReader::new(&data);

        assert_eq!(reader.read_u8().unwrap(), 1);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_u32().unwrap(), 0x1234_5678);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_overrun_reports_truncation_and_keeps_cursor() {
        let data = [0xAA, 0xBB, 0xCC];
        let mut reader = ByteReader::new(&data);
        reader.read_u8().unwrap();

        let err = reader.read_u32().unwrap_err();
        assert_eq!(
            err,
            CodecError::TruncatedMessage {
                needed: 4,
                available: 2
            }
        );
        assert_eq!(reader.position(), 1);
        assert_eq!(reader.read_u16().unwrap(), 0xCCBB);
    }

    #[test]
    fn test_f32_round_trips_bits() {
        let bytes = (-3.25f32).to_le_bytes();
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(reader.read_f32().unwrap(), -3.25);
    }

    #[test]
    fn test_at_clamps_to_len() {
        let data = [1, 2];
        let reader = ByteReader::at(&data, 10);
        assert_eq!(reader.position(), 2);
        assert!(reader.is_empty());
    }
}
