use snap;

use compression::{Compression, Compressor};
use errors::{ErrorKind, Result};

pub struct SnappyCompressor {
    encoder: snap::Encoder,
}

impl SnappyCompressor {
    pub fn new() -> Self {
        SnappyCompressor { encoder: snap::Encoder::new() }
    }
}

impl Compressor for SnappyCompressor {
    fn attribute(&self) -> i8 {
        Compression::Snappy.attribute()
    }

    fn compress(&mut self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        match self.encoder.compress(src, dst) {
            Ok(len) => Ok(len),
            Err(snap::Error::BufferTooSmall { .. }) => bail!(ErrorKind::CompressionOverflow),
            Err(err) => {
                warn!("snappy compression failed: {}", err);

                bail!(ErrorKind::CodecError("snappy compression failed"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use errors::Error;

    #[test]
    fn test_snappy_round_trip() {
        let src = b"hello hello hello hello hello".to_vec();
        let mut dst = vec![0u8; snap::max_compress_len(src.len())];

        let mut compressor = SnappyCompressor::new();
        let len = compressor.compress(&src, &mut dst).unwrap();

        let decoded = snap::Decoder::new().decompress_vec(&dst[..len]).unwrap();

        assert_eq!(decoded, src);
    }

    #[test]
    fn test_snappy_overflow() {
        let src = vec![42u8; 4096];
        let mut dst = vec![0u8; 4];

        let mut compressor = SnappyCompressor::new();

        match compressor.compress(&src, &mut dst) {
            Err(Error(ErrorKind::CompressionOverflow, _)) => {}
            res => panic!("unexpected result: {:?}", res),
        }
    }
}
