use std::fmt::{self, Display};

use serde::{Serialize, Serializer};

/// 160-bit content hash
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Sha1(pub [u8; 20]);

impl Sha1 {
    /// Stands in for every entry of a container that doesn't carry hashes
    pub const ZERO: Sha1 = Sha1([0; 20]);

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl Display for Sha1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

impl fmt::Debug for Sha1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha1({self})")
    }
}

impl Serialize for Sha1 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Serialize a fixed blob as a hex string rather than an array of numbers
pub fn serialize_hex<T, S>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: AsRef<[u8]>,
    S: Serializer,
{
    serializer.serialize_str(&hex::encode(bytes.as_ref()))
}
