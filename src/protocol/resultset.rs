//! Text protocol result sets
//!
//! A COM_QUERY response is either an OK/ERR packet or a result set:
//! column count, one definition per column, EOF, rows, EOF.

use thiserror::Error;

/// Errors decoding a text result set
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResultSetError {
    #[error("Empty payload")]
    Empty,
    #[error("Invalid length encoding")]
    InvalidLength,
    #[error("Truncated value")]
    Truncated,
    #[error("Invalid UTF-8 in column {0}")]
    Utf8(usize),
}

/// One row of a text result set; `None` is SQL NULL
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row {
    values: Vec<Option<String>>,
}

impl Row {
    #[cfg(test)]
    pub fn new(values: Vec<Option<String>>) -> Self {
        Self { values }
    }

    /// Number of columns in the row
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Column value by index; NULL and out-of-range both yield None
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.values.get(idx).and_then(|v| v.as_deref())
    }

    /// Parse a text protocol row holding `columns` values
    pub fn parse(payload: &[u8], columns: usize) -> Result<Self, ResultSetError> {
        let mut values = Vec::with_capacity(columns);
        let mut offset = 0;

        for idx in 0..columns {
            let rest = payload.get(offset..).ok_or(ResultSetError::Truncated)?;
            if rest.first() == Some(&0xFB) {
                values.push(None);
                offset += 1;
                continue;
            }

            let (raw, consumed) = parse_length_encoded_bytes(rest)?;
            let value = String::from_utf8(raw.to_vec()).map_err(|_| ResultSetError::Utf8(idx))?;
            values.push(Some(value));
            offset += consumed;
        }

        Ok(Self { values })
    }
}

/// Parse a length-encoded integer, returning the value and bytes consumed
pub fn parse_length_encoded_int(data: &[u8]) -> Result<(u64, usize), ResultSetError> {
    let first = *data.first().ok_or(ResultSetError::Empty)?;
    match first {
        0..=0xFA => Ok((first as u64, 1)),
        0xFC if data.len() >= 3 => Ok((u16::from_le_bytes([data[1], data[2]]) as u64, 3)),
        0xFD if data.len() >= 4 => Ok((
            u32::from_le_bytes([data[1], data[2], data[3], 0]) as u64,
            4,
        )),
        0xFE if data.len() >= 9 => Ok((
            u64::from_le_bytes([
                data[1], data[2], data[3], data[4], data[5], data[6], data[7], data[8],
            ]),
            9,
        )),
        0xFC..=0xFE => Err(ResultSetError::Truncated),
        _ => Err(ResultSetError::InvalidLength),
    }
}

/// Parse a length-encoded string, returning its bytes and total bytes consumed
pub fn parse_length_encoded_bytes(data: &[u8]) -> Result<(&[u8], usize), ResultSetError> {
    let (len, header_size) = parse_length_encoded_int(data)?;
    let len = usize::try_from(len).map_err(|_| ResultSetError::InvalidLength)?;

    let end = header_size
        .checked_add(len)
        .ok_or(ResultSetError::InvalidLength)?;
    if data.len() < end {
        return Err(ResultSetError::Truncated);
    }

    Ok((&data[header_size..end], end))
}
