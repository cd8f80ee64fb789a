use bytes::Bytes;
use serde::{ser::SerializeMap, Serialize, Serializer};
use uuid::Uuid;

use crate::{error::DecodeError, file_parsers::shared::Sha1};

/// Encoded as the low 5 bits of the type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    Invalid,   // 0x00
    List,      // 0x01
    Object,    // 0x02
    Boolean,   // 0x06
    String,    // 0x07
    Int,       // 0x08
    Long,      // 0x09
    Float,     // 0x0B
    Double,    // 0x0C
    Guid,      // 0x0F
    Sha1,      // 0x10
    ByteArray, // 0x13
}

/// Set on the type byte when no name follows it
pub const ANONYMOUS_FLAG: u8 = 0x80;
const TYPE_MASK: u8 = 0x1F;

impl DbType {
    pub fn from_type_byte(byte: u8) -> Result<Self, DecodeError> {
        use DbType::*;
        let db_type = match byte & TYPE_MASK {
            0x00 => Invalid,
            0x01 => List,
            0x02 => Object,
            0x06 => Boolean,
            0x07 => String,
            0x08 => Int,
            0x09 => Long,
            0x0B => Float,
            0x0C => Double,
            0x0F => Guid,
            0x10 => Sha1,
            0x13 => ByteArray,
            x => return Err(DecodeError::InvalidTypedTree(x)),
        };

        Ok(db_type)
    }

    pub fn code(self) -> u8 {
        use DbType::*;
        match self {
            Invalid => 0x00,
            List => 0x01,
            Object => 0x02,
            Boolean => 0x06,
            String => 0x07,
            Int => 0x08,
            Long => 0x09,
            Float => 0x0B,
            Double => 0x0C,
            Guid => 0x0F,
            Sha1 => 0x10,
            ByteArray => 0x13,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DbValue {
    List(Vec<DbValue>),
    Object(DbObject),
    Boolean(bool),
    String(String),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Guid(Uuid),
    Sha1(Sha1),
    ByteArray(#[serde(serialize_with = "crate::file_parsers::shared::serialize_hex")] Bytes),
}

impl DbValue {
    pub fn db_type(&self) -> DbType {
        match self {
            DbValue::List(_) => DbType::List,
            DbValue::Object(_) => DbType::Object,
            DbValue::Boolean(_) => DbType::Boolean,
            DbValue::String(_) => DbType::String,
            DbValue::Int(_) => DbType::Int,
            DbValue::Long(_) => DbType::Long,
            DbValue::Float(_) => DbType::Float,
            DbValue::Double(_) => DbType::Double,
            DbValue::Guid(_) => DbType::Guid,
            DbValue::Sha1(_) => DbType::Sha1,
            DbValue::ByteArray(_) => DbType::ByteArray,
        }
    }

    pub fn as_object(&self) -> Option<&DbObject> {
        match self {
            DbValue::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[DbValue]> {
        match self {
            DbValue::List(l) => Some(l),
            _ => None,
        }
    }
}

/// Named fields, kept in stream order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DbObject(pub Vec<(String, DbValue)>);

impl DbObject {
    pub fn get(&self, name: &str) -> Option<&DbValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for DbObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
