use super::types::*;
use crate::{
    cursor::{ByteCursor, Endian},
    error::DecodeError,
};

/// Typed trees are always little endian, whatever the surrounding container uses
const ENDIAN: Endian = Endian::Little;
const MAX_DEPTH: usize = 64;

/// Decode the next value and drop its name. `None` when the stream holds an end marker.
pub fn read_db_object(cursor: &mut ByteCursor) -> Result<Option<DbValue>, DecodeError> {
    Ok(read_named_db_object(cursor)?.map(|(_, value)| value))
}

/// Decode the next value along with its name, which is empty for anonymous values
pub fn read_named_db_object(
    cursor: &mut ByteCursor,
) -> Result<Option<(String, DbValue)>, DecodeError> {
    read_value(cursor, 0)
}

fn read_value(
    cursor: &mut ByteCursor,
    depth: usize,
) -> Result<Option<(String, DbValue)>, DecodeError> {
    if depth > MAX_DEPTH {
        return Err(DecodeError::MalformedHeader(format!(
            "Typed tree nested deeper than {MAX_DEPTH} levels"
        )));
    }

    let type_byte = cursor.read_u8()?;
    let db_type = DbType::from_type_byte(type_byte)?;
    if db_type == DbType::Invalid {
        return Ok(None);
    }

    let name = if type_byte & ANONYMOUS_FLAG == 0 {
        cursor.read_null_terminated_string()?
    } else {
        String::new()
    };

    let value = match db_type {
        DbType::Invalid => unreachable!("Handled above"),
        DbType::List => {
            let values = read_children(cursor, depth)?
                .into_iter()
                .map(|(_, v)| v)
                .collect();
            DbValue::List(values)
        }
        DbType::Object => DbValue::Object(DbObject(read_children(cursor, depth)?)),
        DbType::Boolean => DbValue::Boolean(cursor.read_u8()? == 1),
        DbType::String => {
            let len = cursor.read_7bit_encoded()? as usize;
            let raw = cursor.read_bytes(len)?;
            let string = String::from_utf8_lossy(&raw);
            DbValue::String(string.trim_end_matches('\0').to_string())
        }
        DbType::Int => DbValue::Int(cursor.read_i32(ENDIAN)?),
        DbType::Long => DbValue::Long(cursor.read_i64(ENDIAN)?),
        DbType::Float => DbValue::Float(cursor.read_f32(ENDIAN)?),
        DbType::Double => DbValue::Double(cursor.read_f64(ENDIAN)?),
        DbType::Guid => DbValue::Guid(cursor.read_guid(ENDIAN)?),
        DbType::Sha1 => DbValue::Sha1(cursor.read_sha1()?),
        DbType::ByteArray => {
            let len = cursor.read_7bit_encoded()? as usize;
            DbValue::ByteArray(cursor.read_bytes(len)?)
        }
    };

    Ok(Some((name, value)))
}

/// Children of a list or object: a varint byte length, then values until that length is used up
/// or an end marker is hit
fn read_children(
    cursor: &mut ByteCursor,
    depth: usize,
) -> Result<Vec<(String, DbValue)>, DecodeError> {
    let size = cursor.read_7bit_encoded()? as usize;
    let start = cursor.position();

    let mut children = vec![];
    while cursor.position() - start < size {
        match read_value(cursor, depth + 1)? {
            Some(child) => children.push(child),
            None => break,
        }
    }

    Ok(children)
}
