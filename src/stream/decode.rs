use chrono::{DateTime, NaiveDateTime};
use tokio_util::bytes::Bytes;

use super::driver::{FieldDescriptor, FieldFormat};
use crate::error::SqlcmdPgError;
use crate::types::RowValues;

/// PostgreSQL type OIDs the default decoder understands.
mod oid {
    pub const BOOL: u32 = 16;
    pub const BYTEA: u32 = 17;
    pub const INT8: u32 = 20;
    pub const INT2: u32 = 21;
    pub const INT4: u32 = 23;
    pub const JSON: u32 = 114;
    pub const FLOAT4: u32 = 700;
    pub const FLOAT8: u32 = 701;
    pub const TIMESTAMP: u32 = 1114;
    pub const TIMESTAMPTZ: u32 = 1184;
    pub const JSONB: u32 = 3802;
}

/// Decodes raw result-row payloads into typed values using the query's
/// fixed field descriptors.
pub trait RowDecoder: Send {
    /// # Errors
    /// A failure on any field fails the whole row; the cursor treats it as
    /// fatal to the query.
    fn decode_row(
        &self,
        fields: &[FieldDescriptor],
        raw: &[Option<Bytes>],
    ) -> Result<Vec<RowValues>, SqlcmdPgError>;
}

/// Default decoder for text-format result fields.
///
/// Unrecognized type OIDs fall back to `RowValues::Text`; binary-format
/// fields pass through as `RowValues::Blob`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextRowDecoder;

impl RowDecoder for TextRowDecoder {
    fn decode_row(
        &self,
        fields: &[FieldDescriptor],
        raw: &[Option<Bytes>],
    ) -> Result<Vec<RowValues>, SqlcmdPgError> {
        if raw.len() != fields.len() {
            return Err(SqlcmdPgError::DecodeError(format!(
                "row has {} fields but the description lists {}",
                raw.len(),
                fields.len()
            )));
        }
        fields
            .iter()
            .zip(raw)
            .map(|(field, bytes)| decode_field(field, bytes.as_ref()))
            .collect()
    }
}

fn decode_field(
    field: &FieldDescriptor,
    bytes: Option<&Bytes>,
) -> Result<RowValues, SqlcmdPgError> {
    let Some(bytes) = bytes else {
        return Ok(RowValues::Null);
    };
    if field.format == FieldFormat::Binary {
        return Ok(RowValues::Blob(bytes.to_vec()));
    }
    let text = std::str::from_utf8(bytes).map_err(|e| {
        SqlcmdPgError::DecodeError(format!(
            "column \"{}\" is not valid UTF-8: {e}",
            field.name
        ))
    })?;

    match field.type_oid {
        oid::BOOL => match text {
            "t" => Ok(RowValues::Bool(true)),
            "f" => Ok(RowValues::Bool(false)),
            other => Err(decode_error(field, "bool", other)),
        },
        oid::INT2 | oid::INT4 | oid::INT8 => text
            .parse::<i64>()
            .map(RowValues::Int)
            .map_err(|_| decode_error(field, "integer", text)),
        oid::FLOAT4 | oid::FLOAT8 => text
            .parse::<f64>()
            .map(RowValues::Float)
            .map_err(|_| decode_error(field, "float", text)),
        oid::JSON | oid::JSONB => serde_json::from_str(text)
            .map(RowValues::JSON)
            .map_err(|_| decode_error(field, "json", text)),
        oid::BYTEA => decode_hex(field, text),
        oid::TIMESTAMP | oid::TIMESTAMPTZ => decode_timestamp(field, text),
        _ => Ok(RowValues::Text(text.to_string())),
    }
}

/// bytea text format is `\x` followed by lowercase hex pairs.
fn decode_hex(field: &FieldDescriptor, text: &str) -> Result<RowValues, SqlcmdPgError> {
    let digits = text
        .strip_prefix("\\x")
        .ok_or_else(|| decode_error(field, "bytea", text))?;
    if digits.len() % 2 != 0 {
        return Err(decode_error(field, "bytea", text));
    }
    let mut out = Vec::with_capacity(digits.len() / 2);
    for pair in 0..digits.len() / 2 {
        let byte = u8::from_str_radix(&digits[pair * 2..pair * 2 + 2], 16)
            .map_err(|_| decode_error(field, "bytea", text))?;
        out.push(byte);
    }
    Ok(RowValues::Blob(out))
}

fn decode_timestamp(field: &FieldDescriptor, text: &str) -> Result<RowValues, SqlcmdPgError> {
    // timestamptz carries an offset suffix; plain timestamp does not.
    if let Ok(dt) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Ok(RowValues::Timestamp(dt.naive_utc()));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .map(RowValues::Timestamp)
        .map_err(|_| decode_error(field, "timestamp", text))
}

fn decode_error(field: &FieldDescriptor, expected: &str, text: &str) -> SqlcmdPgError {
    SqlcmdPgError::DecodeError(format!(
        "column \"{}\" (oid {}) is not a valid {expected}: {text:?}",
        field.name, field.type_oid
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, type_oid: u32) -> FieldDescriptor {
        FieldDescriptor {
            name: name.to_string(),
            type_oid,
            type_size: -1,
            format: FieldFormat::Text,
        }
    }

    fn raw(text: &str) -> Option<Bytes> {
        Some(Bytes::copy_from_slice(text.as_bytes()))
    }

    #[test]
    fn decodes_common_types() {
        let fields = vec![
            field("id", oid::INT8),
            field("name", 25),
            field("score", oid::FLOAT8),
            field("active", oid::BOOL),
        ];
        let row = TextRowDecoder
            .decode_row(
                &fields,
                &[raw("47"), raw("Smith"), raw("0.5"), raw("t")],
            )
            .unwrap();
        assert_eq!(
            row,
            vec![
                RowValues::Int(47),
                RowValues::Text("Smith".into()),
                RowValues::Float(0.5),
                RowValues::Bool(true),
            ]
        );
    }

    #[test]
    fn null_fields_decode_to_null() {
        let fields = vec![field("age", oid::INT4)];
        let row = TextRowDecoder.decode_row(&fields, &[None]).unwrap();
        assert_eq!(row, vec![RowValues::Null]);
    }

    #[test]
    fn bytea_hex_round_trips() {
        let fields = vec![field("payload", oid::BYTEA)];
        let row = TextRowDecoder
            .decode_row(&fields, &[raw("\\x00ff10")])
            .unwrap();
        assert_eq!(row, vec![RowValues::Blob(vec![0x00, 0xff, 0x10])]);
    }

    #[test]
    fn timestamps_parse_with_and_without_fraction() {
        let fields = vec![field("ts", oid::TIMESTAMP)];
        for text in ["2021-08-06 16:00:00", "2021-08-06 16:00:00.123"] {
            let row = TextRowDecoder.decode_row(&fields, &[raw(text)]).unwrap();
            assert!(matches!(row[0], RowValues::Timestamp(_)), "{text}");
        }
    }

    #[test]
    fn bad_integer_is_a_decode_error() {
        let fields = vec![field("id", oid::INT8)];
        let err = TextRowDecoder
            .decode_row(&fields, &[raw("not-a-number")])
            .unwrap_err();
        assert!(matches!(err, SqlcmdPgError::DecodeError(_)));
    }

    #[test]
    fn field_count_mismatch_is_a_decode_error() {
        let fields = vec![field("id", oid::INT8)];
        let err = TextRowDecoder
            .decode_row(&fields, &[raw("1"), raw("2")])
            .unwrap_err();
        assert!(matches!(err, SqlcmdPgError::DecodeError(_)));
    }

    #[test]
    fn unknown_oid_falls_back_to_text() {
        let fields = vec![field("x", 600)];
        let row = TextRowDecoder.decode_row(&fields, &[raw("(1,2)")]).unwrap();
        assert_eq!(row, vec![RowValues::Text("(1,2)".into())]);
    }
}
