use std::io::{self, Read, Write};

use serde::{Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};

/// Writes the frame's little-endian scalars and bincode-encoded payloads to a byte sink.
pub struct Encoder<'a> {
    out: &'a mut dyn Write,
}

impl<'a> Encoder<'a> {
    pub fn new<W: Write>(out: &'a mut W) -> Self {
        Self { out }
    }

    /// Write raw bytes with no length prefix.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.write_all(bytes)?;
        Ok(())
    }

    #[inline]
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    #[inline]
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Write a collection length as a `u64`.
    #[inline]
    pub fn write_len(&mut self, len: usize) -> Result<()> {
        self.write_u64(len as u64)
    }

    /// Write a component payload with bincode's default encoding.
    pub fn write_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        bincode::serialize_into(&mut *self.out, value)?;
        Ok(())
    }
}

/// Reads what an [`Encoder`] wrote.
///
/// Hitting the end of the source mid-value is reported as [`Error::Truncated`].
pub struct Decoder<'a> {
    input: &'a mut dyn Read,
}

impl<'a> Decoder<'a> {
    pub fn new<R: Read>(input: &'a mut R) -> Self {
        Self { input }
    }

    /// Fill `bytes` from the source.
    #[inline]
    pub fn read_bytes(&mut self, bytes: &mut [u8]) -> Result<()> {
        self.input.read_exact(bytes).map_err(|error| match error.kind() {
            io::ErrorKind::UnexpectedEof => Error::Truncated,
            _ => Error::Io(error),
        })
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        let mut bytes = [0; 1];
        self.read_bytes(&mut bytes)?;
        Ok(bytes[0])
    }

    #[inline]
    pub fn read_u64(&mut self) -> Result<u64> {
        let mut bytes = [0; 8];
        self.read_bytes(&mut bytes)?;
        Ok(u64::from_le_bytes(bytes))
    }

    /// Read a collection length written by [`Encoder::write_len`].
    #[inline]
    pub fn read_len(&mut self) -> Result<usize> {
        usize::try_from(self.read_u64()?).map_err(|_| Error::InvalidStream {
            reason: "length does not fit in memory",
        })
    }

    /// Read a component payload written by [`Encoder::write_value`].
    pub fn read_value<T: DeserializeOwned>(&mut self) -> Result<T> {
        Ok(bincode::deserialize_from(&mut *self.input)?)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Crate {
        label: String,
        slots: Vec<Option<u16>>,
        grid: [u8; 2],
        open: bool,
    }

    fn encode<T: Serialize>(value: &T) -> Vec<u8> {
        let mut bytes = Vec::new();
        Encoder::new(&mut bytes).write_value(value).unwrap();
        bytes
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        let mut input = bytes;
        Decoder::new(&mut input).read_value()
    }

    #[test]
    fn frame_scalars_are_little_endian() {
        // Given
        let mut bytes = Vec::new();
        let mut encoder = Encoder::new(&mut bytes);

        // When
        encoder.write_len(0x0102).unwrap();
        encoder.write_u8(9).unwrap();

        // Then
        assert_eq!(bytes, vec![2, 1, 0, 0, 0, 0, 0, 0, 9]);
        let mut input = bytes.as_slice();
        let mut decoder = Decoder::new(&mut input);
        assert_eq!(decoder.read_len().unwrap(), 0x0102);
        assert_eq!(decoder.read_u8().unwrap(), 9);
    }

    #[test]
    fn payloads_use_fixed_width_little_endian_fields() {
        assert_eq!(encode(&0x0102_0304u32), vec![4, 3, 2, 1]);
        assert_eq!(encode(&-2i16), vec![0xfe, 0xff]);
        assert_eq!(encode(&true), vec![1]);
        assert_eq!(
            encode(&String::from("hi")),
            vec![2, 0, 0, 0, 0, 0, 0, 0, b'h', b'i']
        );
    }

    #[test]
    fn nested_values_read_back() {
        // Given
        let value = Crate {
            label: "spares".into(),
            slots: vec![Some(1), None, Some(3)],
            grid: [4, 5],
            open: true,
        };

        // When
        let decoded: Crate = decode(&encode(&value)).unwrap();

        // Then
        assert_eq!(decoded, value);
    }

    #[test]
    fn payload_reads_stop_at_the_value_end() {
        // Given - two payloads back to back followed by a frame scalar
        let mut bytes = encode(&7u16);
        bytes.extend(encode(&String::from("x")));
        bytes.push(42);
        let mut input = bytes.as_slice();
        let mut decoder = Decoder::new(&mut input);

        // Then
        assert_eq!(decoder.read_value::<u16>().unwrap(), 7);
        assert_eq!(decoder.read_value::<String>().unwrap(), "x");
        assert_eq!(decoder.read_u8().unwrap(), 42);
    }

    #[test]
    fn short_input_is_truncated() {
        assert!(matches!(decode::<u64>(&[1, 2, 3]), Err(Error::Truncated)));
        assert!(matches!(
            decode::<String>(&[5, 0, 0, 0, 0, 0, 0, 0, b'a']),
            Err(Error::Truncated)
        ));
    }

    #[test]
    fn malformed_payloads_are_invalid() {
        assert!(matches!(
            decode::<bool>(&[7]),
            Err(Error::InvalidPayload(_))
        ));
        assert!(matches!(
            decode::<String>(&[1, 0, 0, 0, 0, 0, 0, 0, 0xff]),
            Err(Error::InvalidPayload(_))
        ));
    }
}
