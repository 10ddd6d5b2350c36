use std::fmt;
use std::str::FromStr;

use errors::{Error, ErrorKind, Result};

#[cfg(feature = "gzip")]
mod gzip;
#[cfg(feature = "snappy")]
mod snappy;

#[cfg(feature = "gzip")]
pub use self::gzip::GzipCompressor;
#[cfg(feature = "snappy")]
pub use self::snappy::SnappyCompressor;

/// The compression codec applied to a whole message set.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i8)]
pub enum Compression {
    None = 0,
    Gzip = 1,
    Snappy = 2,
}

impl Default for Compression {
    fn default() -> Self {
        Compression::None
    }
}

impl From<i8> for Compression {
    fn from(v: i8) -> Self {
        match v {
            1 => Compression::Gzip,
            2 => Compression::Snappy,
            _ => Compression::None,
        }
    }
}

impl FromStr for Compression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Compression::None),
            "gzip" => Ok(Compression::Gzip),
            "snappy" => Ok(Compression::Snappy),
            _ => bail!(ErrorKind::UnsupportedCompression(s.to_owned())),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Compression {
    pub fn name(&self) -> &'static str {
        match *self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Snappy => "snappy",
        }
    }

    /// The codec marker stored in the message attribute byte.
    pub fn attribute(&self) -> i8 {
        *self as i8
    }

    /// Builds the codec for this selector, `None` when nothing is compressed.
    ///
    /// Selecting a codec that was compiled out fails, which surfaces a bad
    /// configuration at construction instead of on the first batch.
    #[allow(unused_variables)]
    pub fn compressor(&self, level: u32) -> Result<Option<Box<Compressor>>> {
        match *self {
            Compression::None => Ok(None),
            #[cfg(feature = "gzip")]
            Compression::Gzip => Ok(Some(Box::new(GzipCompressor::new(level)))),
            #[cfg(feature = "snappy")]
            Compression::Snappy => Ok(Some(Box::new(SnappyCompressor::new()))),
            #[allow(unreachable_patterns)]
            codec => bail!(ErrorKind::UnsupportedCompression(codec.name().to_owned())),
        }
    }
}

/// A codec that squeezes a whole message set into the value of a single
/// wrapper message.
pub trait Compressor: Send {
    /// The codec marker for the wrapper message attribute byte.
    fn attribute(&self) -> i8;

    /// Compresses `src` into `dst`, returning the number of bytes written.
    ///
    /// Fails with `CompressionOverflow` when `dst` cannot hold the output.
    fn compress(&mut self, src: &[u8], dst: &mut [u8]) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str() {
        assert_eq!("none".parse::<Compression>().unwrap(), Compression::None);
        assert_eq!("gzip".parse::<Compression>().unwrap(), Compression::Gzip);
        assert_eq!("snappy".parse::<Compression>().unwrap(), Compression::Snappy);
        assert!("lzo".parse::<Compression>().is_err());
    }

    #[test]
    fn test_attributes() {
        assert_eq!(Compression::None.attribute(), 0);
        assert_eq!(Compression::Gzip.attribute(), 1);
        assert_eq!(Compression::Snappy.attribute(), 2);
        assert_eq!(Compression::from(2), Compression::Snappy);
    }
}
