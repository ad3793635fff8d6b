//! JSON reference row codec.
//!
//! Keys are the destination table id in big-endian followed by the
//! primary-key bytes; values are JSON arrays of datums. An empty value
//! decodes as a delete. Real deployments plug in their own codec; this one
//! keeps the wire format inspectable in tests and logs.

use relay_engine::{
    Datum, DecodeError, DecodedRow, EncodeError, RowDecoder, RowEncoder, RowKey, RowPart,
    RowValue, TableId, TableSchema,
};

/// Encoder/decoder over JSON datum arrays.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRowCodec;

impl JsonRowCodec {
    /// Create the codec.
    pub fn new() -> Self {
        Self
    }

    /// Build a key for `table` from primary-key bytes.
    pub fn encode_key(table: TableId, pk: &[u8]) -> RowKey {
        let mut key = table.to_be_bytes().to_vec();
        key.extend_from_slice(pk);
        key
    }

    /// Read the table id a key addresses.
    pub fn table_from_key(key: &[u8]) -> Result<TableId, DecodeError> {
        if key.len() < 4 {
            return Err(DecodeError::MalformedKey(
                "key shorter than a table id".into(),
            ));
        }
        let mut id = [0u8; 4];
        id.copy_from_slice(&key[..4]);
        Ok(TableId::from_be_bytes(id))
    }
}

impl RowDecoder for JsonRowCodec {
    fn decode(
        &self,
        key: &[u8],
        value: &RowValue,
        part: RowPart,
    ) -> Result<DecodedRow, DecodeError> {
        let source_table = Self::table_from_key(key)?;

        if !value.present() {
            return Ok(DecodedRow {
                source_table,
                values: Vec::new(),
                is_deleted: true,
                origin: value.timestamp,
            });
        }

        let values: Vec<Datum> =
            serde_json::from_slice(&value.raw).map_err(|e| DecodeError::MalformedValue {
                part,
                reason: e.to_string(),
            })?;
        Ok(DecodedRow {
            source_table,
            values,
            is_deleted: false,
            origin: value.timestamp,
        })
    }
}

impl RowEncoder for JsonRowCodec {
    fn encode_row(&self, table: &TableSchema, values: &[Datum]) -> Result<Vec<u8>, EncodeError> {
        let expected = table.writable_indices().len();
        if values.len() != expected {
            return Err(EncodeError::ColumnCountMismatch {
                table: table.id,
                expected,
                got: values.len(),
            });
        }
        serde_json::to_vec(values).map_err(|e| EncodeError::Unencodable(e.to_string()))
    }
}
