use std::io;
use std::io::{Cursor, Write};

use flate2::write::GzEncoder;

use compression::{Compression, Compressor};
use errors::{Error, ErrorKind, Result};

pub struct GzipCompressor {
    level: u32,
}

impl GzipCompressor {
    pub fn new(level: u32) -> Self {
        GzipCompressor { level: level }
    }
}

impl Compressor for GzipCompressor {
    fn attribute(&self) -> i8 {
        Compression::Gzip.attribute()
    }

    fn compress(&mut self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        let mut cursor = Cursor::new(dst);

        {
            let mut encoder =
                GzEncoder::new(&mut cursor, ::flate2::Compression::new(self.level));

            encoder.write_all(src).map_err(overflow)?;
            encoder.finish().map_err(overflow)?;
        }

        Ok(cursor.position() as usize)
    }
}

/// A full destination reports `WriteZero`; everything else is a real I/O fault.
fn overflow(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::WriteZero {
        ErrorKind::CompressionOverflow.into()
    } else {
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;

    use super::*;

    #[test]
    fn test_gzip_round_trip() {
        let src = b"hello hello hello hello hello".to_vec();
        let mut dst = vec![0u8; 256];

        let mut compressor = GzipCompressor::new(6);
        let len = compressor.compress(&src, &mut dst).unwrap();

        let mut decoded = Vec::new();
        GzDecoder::new(&dst[..len]).read_to_end(&mut decoded).unwrap();

        assert_eq!(decoded, src);
    }

    #[test]
    fn test_gzip_overflow() {
        let src = vec![42u8; 4096];
        let mut dst = vec![0u8; 8];

        let mut compressor = GzipCompressor::new(6);

        match compressor.compress(&src, &mut dst) {
            Err(Error(ErrorKind::CompressionOverflow, _)) => {}
            res => panic!("unexpected result: {:?}", res),
        }
    }
}
