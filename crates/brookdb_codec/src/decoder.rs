//! Streaming slice decoder.
//!
//! Compressed bytes go in through [`SliceDecoder::feed`]; parsed headers and
//! rows come out through the `parse_*` cursor methods. Parse methods never
//! consume bytes on `NeedMoreData`, so callers can re-enter with the same
//! state after the next feed.

use zstd::stream::raw::{Decoder as ZstdStream, InBuffer, Operation, OutBuffer};

use crate::error::{SliceError, SliceResult};
use crate::slice::{SliceHeader, TableHeader, MAX_COLUMNS, MAX_DECLARED_TABLES, MAX_NAME_LENGTH};
use crate::value::{FieldValue, TypeTag, END_OF_TABLE_DELIMITER};
use crate::varint;

/// Maximum declared size of a single row field.
const MAX_FIELD_SIZE: u64 = 10 * 1024 * 1024;

/// Compact once the read offset passes this many dead bytes.
const COMPACTION_THRESHOLD: usize = 2 * 1024 * 1024;

/// Reallocate instead of reusing a fully-drained buffer above this capacity.
const MAX_BUFFER_CAPACITY: usize = 16 * 1024 * 1024;

/// Scratch size for each decompression step.
const DECOMPRESS_CHUNK: usize = 128 * 1024;

/// Outcome of [`SliceDecoder::parse_slice_header`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderStep {
    /// The header parsed completely.
    Header(SliceHeader),
    /// The header is not fully buffered yet.
    NeedMoreData,
}

/// Outcome of [`SliceDecoder::parse_table_header`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableStep {
    /// A table header parsed completely.
    Table(TableHeader),
    /// The header is not fully buffered yet.
    NeedMoreData,
    /// All tables have been consumed.
    EndOfStream,
}

/// Outcome of [`SliceDecoder::parse_row`].
#[derive(Debug, Clone, PartialEq)]
pub enum RowStep {
    /// A row parsed completely; values align with the table's columns.
    Row(Vec<FieldValue>),
    /// The row is not fully buffered yet.
    NeedMoreData,
    /// The end-of-table delimiter is next; the current table is finished.
    EndOfTable,
}

/// Streaming decompressor and cursor parser for slice streams.
///
/// One decoder serves one import and is dropped afterwards. Feeding drives
/// zstd decompression into an internal buffer; parsing consumes that buffer
/// from a read offset which [`SliceDecoder::compact_buffer`] periodically
/// rewinds.
pub struct SliceDecoder {
    stream: ZstdStream<'static>,
    frame_ended: bool,
    buf: Vec<u8>,
    offset: usize,
    header_parsed: bool,
    expecting_table_header: bool,
    expected_tables: i64,
    tables_parsed: i64,
}

impl SliceDecoder {
    /// Creates a decoder with a fresh zstd decompression stream.
    ///
    /// # Errors
    ///
    /// Returns [`SliceError::Decompression`] if the stream cannot be created.
    pub fn new() -> SliceResult<Self> {
        let stream = ZstdStream::new().map_err(|e| SliceError::Decompression {
            message: format!("failed to create decompression stream: {e}"),
        })?;
        Ok(Self {
            stream,
            frame_ended: false,
            buf: Vec::new(),
            offset: 0,
            header_parsed: false,
            expecting_table_header: true,
            expected_tables: 0,
            tables_parsed: 0,
        })
    }

    /// Feeds a chunk of compressed bytes, appending everything that
    /// decompresses to the internal buffer.
    ///
    /// # Errors
    ///
    /// Any zstd error is fatal to the import.
    pub fn feed(&mut self, data: &[u8]) -> SliceResult<()> {
        let mut input = InBuffer::around(data);
        let mut scratch = vec![0u8; DECOMPRESS_CHUNK];

        while input.pos < input.src.len() {
            let before = input.pos;
            let mut output = OutBuffer::around(&mut scratch[..]);
            let hint = self
                .stream
                .run(&mut input, &mut output)
                .map_err(|e| SliceError::Decompression {
                    message: format!("decompression error: {e}"),
                })?;

            if output.pos() > 0 {
                self.buf.extend_from_slice(output.as_slice());
            }
            if hint == 0 {
                self.frame_ended = true;
            }
            if input.pos == before && output.pos() == 0 {
                return Err(SliceError::Decompression {
                    message: "decompression made no progress".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Number of decompressed bytes not yet consumed by parsing.
    pub fn remaining_bytes(&self) -> usize {
        self.buf.len() - self.offset
    }

    /// True once the zstd frame has fully ended.
    pub fn is_end_of_stream(&self) -> bool {
        self.frame_ended
    }

    /// Reclaims buffer space occupied by already-parsed bytes.
    ///
    /// Safe to call at any point between parse calls; it never changes parse
    /// results, only where the unparsed tail lives.
    pub fn compact_buffer(&mut self) {
        if self.offset == self.buf.len() {
            if self.buf.capacity() > MAX_BUFFER_CAPACITY {
                self.buf = Vec::new();
            } else {
                self.buf.clear();
            }
            self.offset = 0;
            return;
        }

        if self.offset > COMPACTION_THRESHOLD || self.offset > self.buf.len() / 2 {
            self.buf.drain(..self.offset);
            self.offset = 0;
        }
    }

    /// Parses the slice header. Must succeed once before any table parsing.
    ///
    /// # Errors
    ///
    /// Fails on corrupt or truncated header fields, an out-of-range declared
    /// table count, or a second call after success.
    pub fn parse_slice_header(&mut self) -> SliceResult<HeaderStep> {
        if self.header_parsed {
            return Err(SliceError::HeaderAlreadyParsed);
        }

        let mut offset = self.offset;
        let Some(slice_id) = self.take_string(&mut offset, "sliceId")? else {
            return Ok(HeaderStep::NeedMoreData);
        };
        let Some(version) = self.take_varint(&mut offset, "version")? else {
            return Ok(HeaderStep::NeedMoreData);
        };
        let Some(priority) = self.take_string(&mut offset, "priority")? else {
            return Ok(HeaderStep::NeedMoreData);
        };
        let Some(timestamp) = self.take_varint(&mut offset, "timestamp")? else {
            return Ok(HeaderStep::NeedMoreData);
        };
        let Some(number_of_tables) = self.take_varint(&mut offset, "numberOfTables")? else {
            return Ok(HeaderStep::NeedMoreData);
        };

        let number_of_tables = number_of_tables as i64;
        if !(0..=MAX_DECLARED_TABLES).contains(&number_of_tables) {
            return Err(SliceError::CountOutOfRange {
                field: "numberOfTables".to_string(),
                value: number_of_tables,
            });
        }

        self.offset = offset;
        self.header_parsed = true;
        self.expecting_table_header = true;
        self.expected_tables = number_of_tables;
        self.tables_parsed = 0;

        Ok(HeaderStep::Header(SliceHeader {
            slice_id,
            version: version as i64,
            priority,
            timestamp: timestamp as i64,
            number_of_tables,
        }))
    }

    /// Parses the next table header, consuming the end-of-table delimiter
    /// left behind by the previous table first.
    ///
    /// When the slice declared `numberOfTables > 0`, exactly that many
    /// headers parse before `EndOfStream`. A declared count of zero streams
    /// tables until the frame ends.
    ///
    /// # Errors
    ///
    /// Fails on a missing delimiter, corrupt or truncated names, an invalid
    /// column count, or a frame that ends before all declared tables.
    pub fn parse_table_header(&mut self) -> SliceResult<TableStep> {
        if self.remaining_bytes() == 0 {
            return self.table_end_or_need();
        }

        if self.expecting_table_header {
            // The previous table's trailing delimiter, if any.
            if self.buf[self.offset] == END_OF_TABLE_DELIMITER {
                self.offset += 1;
                if self.remaining_bytes() == 0 {
                    return self.table_end_or_need();
                }
            }
        } else {
            if self.buf[self.offset] != END_OF_TABLE_DELIMITER {
                return Err(SliceError::MissingDelimiter);
            }
            self.offset += 1;
            self.expecting_table_header = true;
            if self.remaining_bytes() == 0 {
                return self.table_end_or_need();
            }
        }

        if self.expected_tables > 0 && self.tables_parsed >= self.expected_tables {
            return Ok(TableStep::EndOfStream);
        }

        let mut offset = self.offset;
        let Some(table_name) = self.take_string(&mut offset, "table name")? else {
            return Ok(TableStep::NeedMoreData);
        };
        if table_name.is_empty() || table_name.len() > MAX_NAME_LENGTH {
            return Err(SliceError::InvalidNameLength {
                field: "table name".to_string(),
            });
        }

        let Some(column_count) = self.take_varint(&mut offset, "column count")? else {
            return Ok(TableStep::NeedMoreData);
        };
        if column_count < 1 || column_count > MAX_COLUMNS as u64 {
            return Err(SliceError::CountOutOfRange {
                field: "column count".to_string(),
                value: column_count as i64,
            });
        }

        let mut columns = Vec::with_capacity(column_count as usize);
        for _ in 0..column_count {
            let Some(column) = self.take_string(&mut offset, "column name")? else {
                return Ok(TableStep::NeedMoreData);
            };
            if column.is_empty() || column.len() > MAX_NAME_LENGTH {
                return Err(SliceError::InvalidNameLength {
                    field: "column name".to_string(),
                });
            }
            columns.push(column);
        }

        self.offset = offset;
        self.expecting_table_header = false;
        self.tables_parsed += 1;

        Ok(TableStep::Table(TableHeader {
            table_name,
            columns,
        }))
    }

    /// Parses the next row of the current table.
    ///
    /// `columns` is the column list from the table header; the returned
    /// values align with it positionally. On success the read offset always
    /// advances, which the import engine relies on as its infinite-loop
    /// guard.
    ///
    /// # Errors
    ///
    /// Fails on oversized fields, wrong INT/REAL widths, unknown type tags,
    /// invalid UTF-8 text, or a frame that ends mid-row.
    pub fn parse_row(&mut self, columns: &[String]) -> SliceResult<RowStep> {
        if self.remaining_bytes() == 0 {
            if self.frame_ended {
                return Err(SliceError::Truncated {
                    field: "row".to_string(),
                });
            }
            return Ok(RowStep::NeedMoreData);
        }

        if self.buf[self.offset] == END_OF_TABLE_DELIMITER {
            self.expecting_table_header = true;
            return Ok(RowStep::EndOfTable);
        }

        let mut offset = self.offset;
        let mut row = Vec::with_capacity(columns.len());

        for _ in columns {
            let Some(field_size) = self.take_varint(&mut offset, "field size")? else {
                return Ok(RowStep::NeedMoreData);
            };
            if field_size > MAX_FIELD_SIZE {
                return Err(SliceError::FieldTooLarge { size: field_size });
            }
            let size = field_size as usize;

            if size == 0 {
                // Zero length means NULL; the tag byte is consumed unchecked.
                if offset >= self.buf.len() {
                    if self.frame_ended {
                        return Err(SliceError::Truncated {
                            field: "NULL type tag".to_string(),
                        });
                    }
                    return Ok(RowStep::NeedMoreData);
                }
                row.push(FieldValue::Null);
                offset += 1;
                continue;
            }

            if self.buf.len() < offset + size + 1 {
                if self.frame_ended {
                    return Err(SliceError::Truncated {
                        field: "field value".to_string(),
                    });
                }
                return Ok(RowStep::NeedMoreData);
            }

            let tag_byte = self.buf[offset + size];
            let value_bytes = &self.buf[offset..offset + size];

            let value = match TypeTag::from_byte(tag_byte) {
                Some(TypeTag::Null) => FieldValue::Null,
                Some(TypeTag::Int) => {
                    if size != 8 {
                        return Err(SliceError::FixedWidthSize { kind: "INT", size });
                    }
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(value_bytes);
                    FieldValue::Int(i64::from_be_bytes(raw))
                }
                Some(TypeTag::Real) => {
                    if size != 8 {
                        return Err(SliceError::FixedWidthSize { kind: "REAL", size });
                    }
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(value_bytes);
                    FieldValue::Real(f64::from_bits(u64::from_be_bytes(raw)))
                }
                Some(TypeTag::Text) => {
                    let text = std::str::from_utf8(value_bytes).map_err(|_| {
                        SliceError::InvalidUtf8 {
                            field: "TEXT field".to_string(),
                        }
                    })?;
                    FieldValue::Text(text.to_string())
                }
                Some(TypeTag::Blob) => FieldValue::Blob(value_bytes.to_vec()),
                None => return Err(SliceError::UnknownTypeTag { tag: tag_byte }),
            };

            row.push(value);
            offset += size + 1;
        }

        self.offset = offset;
        Ok(RowStep::Row(row))
    }

    fn table_end_or_need(&self) -> SliceResult<TableStep> {
        if self.frame_ended {
            if self.tables_parsed < self.expected_tables {
                return Err(SliceError::MissingTables {
                    parsed: self.tables_parsed,
                    expected: self.expected_tables,
                });
            }
            return Ok(TableStep::EndOfStream);
        }
        Ok(TableStep::NeedMoreData)
    }

    fn take_varint(&self, offset: &mut usize, field: &'static str) -> SliceResult<Option<u64>> {
        match varint::decode_varint(&self.buf, *offset, field)? {
            Some((value, read)) => {
                *offset += read;
                Ok(Some(value))
            }
            None if self.frame_ended => Err(SliceError::Truncated {
                field: field.to_string(),
            }),
            None => Ok(None),
        }
    }

    fn take_string(&self, offset: &mut usize, field: &'static str) -> SliceResult<Option<String>> {
        match varint::decode_string(&self.buf, *offset, field)? {
            Some((value, read)) => {
                *offset += read;
                Ok(Some(value))
            }
            None if self.frame_ended => Err(SliceError::Truncated {
                field: field.to_string(),
            }),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_varint(out: &mut Vec<u8>, mut value: u64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                out.push(byte);
                break;
            }
            out.push(byte | 0x80);
        }
    }

    fn put_string(out: &mut Vec<u8>, s: &str) {
        put_varint(out, s.len() as u64);
        out.extend_from_slice(s.as_bytes());
    }

    fn put_text_field(out: &mut Vec<u8>, s: &str) {
        put_varint(out, s.len() as u64);
        out.extend_from_slice(s.as_bytes());
        out.push(TypeTag::Text as u8);
    }

    fn put_int_field(out: &mut Vec<u8>, v: i64) {
        put_varint(out, 8);
        out.extend_from_slice(&v.to_be_bytes());
        out.push(TypeTag::Int as u8);
    }

    fn put_null_field(out: &mut Vec<u8>, tag: u8) {
        put_varint(out, 0);
        out.push(tag);
    }

    fn slice_header_bytes(number_of_tables: i64) -> Vec<u8> {
        let mut out = Vec::new();
        put_string(&mut out, "slice-1");
        put_varint(&mut out, 3);
        put_string(&mut out, "high");
        put_varint(&mut out, 1_700_000_000);
        put_varint(&mut out, number_of_tables as u64);
        out
    }

    fn compress(raw: &[u8]) -> Vec<u8> {
        zstd::encode_all(raw, 3).unwrap()
    }

    fn fed_decoder(raw: &[u8]) -> SliceDecoder {
        let mut decoder = SliceDecoder::new().unwrap();
        decoder.feed(&compress(raw)).unwrap();
        decoder
    }

    fn expect_header(decoder: &mut SliceDecoder) -> SliceHeader {
        match decoder.parse_slice_header().unwrap() {
            HeaderStep::Header(h) => h,
            HeaderStep::NeedMoreData => panic!("header should be complete"),
        }
    }

    fn expect_table(decoder: &mut SliceDecoder) -> TableHeader {
        match decoder.parse_table_header().unwrap() {
            TableStep::Table(t) => t,
            other => panic!("expected table header, got {other:?}"),
        }
    }

    #[test]
    fn parses_slice_header() {
        let mut decoder = fed_decoder(&slice_header_bytes(0));
        let header = expect_header(&mut decoder);
        assert_eq!(header.slice_id, "slice-1");
        assert_eq!(header.version, 3);
        assert_eq!(header.priority, "high");
        assert_eq!(header.timestamp, 1_700_000_000);
        assert_eq!(header.number_of_tables, 0);
        assert_eq!(decoder.remaining_bytes(), 0);
    }

    #[test]
    fn header_twice_is_an_error() {
        let mut decoder = fed_decoder(&slice_header_bytes(0));
        expect_header(&mut decoder);
        assert!(matches!(
            decoder.parse_slice_header(),
            Err(SliceError::HeaderAlreadyParsed)
        ));
    }

    #[test]
    fn declared_table_count_out_of_range() {
        let mut raw = Vec::new();
        put_string(&mut raw, "s");
        put_varint(&mut raw, 1);
        put_string(&mut raw, "p");
        put_varint(&mut raw, 0);
        put_varint(&mut raw, 10_001);
        let mut decoder = fed_decoder(&raw);
        assert!(matches!(
            decoder.parse_slice_header(),
            Err(SliceError::CountOutOfRange { .. })
        ));
    }

    #[test]
    fn single_table_round_trip() {
        let mut raw = slice_header_bytes(1);
        put_string(&mut raw, "tasks");
        put_varint(&mut raw, 2);
        put_string(&mut raw, "id");
        put_string(&mut raw, "name");
        put_text_field(&mut raw, "t1");
        put_text_field(&mut raw, "Alpha");
        raw.push(END_OF_TABLE_DELIMITER);

        let mut decoder = fed_decoder(&raw);
        expect_header(&mut decoder);

        let table = expect_table(&mut decoder);
        assert_eq!(table.table_name, "tasks");
        assert_eq!(table.columns, vec!["id".to_string(), "name".to_string()]);

        match decoder.parse_row(&table.columns).unwrap() {
            RowStep::Row(row) => {
                assert_eq!(
                    row,
                    vec![
                        FieldValue::Text("t1".into()),
                        FieldValue::Text("Alpha".into())
                    ]
                );
            }
            other => panic!("expected row, got {other:?}"),
        }

        assert_eq!(
            decoder.parse_row(&table.columns).unwrap(),
            RowStep::EndOfTable
        );
        assert_eq!(
            decoder.parse_table_header().unwrap(),
            TableStep::EndOfStream
        );
        assert_eq!(decoder.remaining_bytes(), 0);
    }

    #[test]
    fn zero_row_table_is_accepted() {
        let mut raw = slice_header_bytes(1);
        put_string(&mut raw, "empty");
        put_varint(&mut raw, 1);
        put_string(&mut raw, "id");
        raw.push(END_OF_TABLE_DELIMITER);

        let mut decoder = fed_decoder(&raw);
        expect_header(&mut decoder);
        let table = expect_table(&mut decoder);
        assert_eq!(
            decoder.parse_row(&table.columns).unwrap(),
            RowStep::EndOfTable
        );
        assert_eq!(
            decoder.parse_table_header().unwrap(),
            TableStep::EndOfStream
        );
        assert_eq!(decoder.remaining_bytes(), 0);
    }

    #[test]
    fn legacy_zero_table_count_streams_until_frame_end() {
        let mut raw = slice_header_bytes(0);
        for table in ["a", "b"] {
            put_string(&mut raw, table);
            put_varint(&mut raw, 1);
            put_string(&mut raw, "id");
            put_int_field(&mut raw, 7);
            raw.push(END_OF_TABLE_DELIMITER);
        }

        let mut decoder = fed_decoder(&raw);
        expect_header(&mut decoder);
        for expected in ["a", "b"] {
            let table = expect_table(&mut decoder);
            assert_eq!(table.table_name, expected);
            assert!(matches!(
                decoder.parse_row(&table.columns).unwrap(),
                RowStep::Row(_)
            ));
            assert_eq!(
                decoder.parse_row(&table.columns).unwrap(),
                RowStep::EndOfTable
            );
        }
        assert_eq!(
            decoder.parse_table_header().unwrap(),
            TableStep::EndOfStream
        );
    }

    #[test]
    fn frame_ending_early_reports_missing_tables() {
        let mut raw = slice_header_bytes(2);
        put_string(&mut raw, "only");
        put_varint(&mut raw, 1);
        put_string(&mut raw, "id");
        raw.push(END_OF_TABLE_DELIMITER);

        let mut decoder = fed_decoder(&raw);
        expect_header(&mut decoder);
        let table = expect_table(&mut decoder);
        assert_eq!(
            decoder.parse_row(&table.columns).unwrap(),
            RowStep::EndOfTable
        );
        assert!(matches!(
            decoder.parse_table_header(),
            Err(SliceError::MissingTables {
                parsed: 1,
                expected: 2
            })
        ));
    }

    #[test]
    fn null_field_ignores_tag_byte() {
        let mut raw = slice_header_bytes(1);
        put_string(&mut raw, "t");
        put_varint(&mut raw, 2);
        put_string(&mut raw, "a");
        put_string(&mut raw, "b");
        put_null_field(&mut raw, 0x00);
        put_null_field(&mut raw, 0x42); // nonzero tag, still NULL
        raw.push(END_OF_TABLE_DELIMITER);

        let mut decoder = fed_decoder(&raw);
        expect_header(&mut decoder);
        let table = expect_table(&mut decoder);
        match decoder.parse_row(&table.columns).unwrap() {
            RowStep::Row(row) => assert_eq!(row, vec![FieldValue::Null, FieldValue::Null]),
            other => panic!("expected row, got {other:?}"),
        }
    }

    #[test]
    fn wrong_int_width_is_fatal() {
        let mut raw = slice_header_bytes(1);
        put_string(&mut raw, "t");
        put_varint(&mut raw, 1);
        put_string(&mut raw, "n");
        put_varint(&mut raw, 4);
        raw.extend_from_slice(&[0, 0, 0, 1]);
        raw.push(TypeTag::Int as u8);
        raw.push(END_OF_TABLE_DELIMITER);

        let mut decoder = fed_decoder(&raw);
        expect_header(&mut decoder);
        let table = expect_table(&mut decoder);
        assert!(matches!(
            decoder.parse_row(&table.columns),
            Err(SliceError::FixedWidthSize { kind: "INT", .. })
        ));
    }

    #[test]
    fn unknown_type_tag_is_fatal() {
        let mut raw = slice_header_bytes(1);
        put_string(&mut raw, "t");
        put_varint(&mut raw, 1);
        put_string(&mut raw, "c");
        put_varint(&mut raw, 1);
        raw.push(b'x');
        raw.push(0x09);
        raw.push(END_OF_TABLE_DELIMITER);

        let mut decoder = fed_decoder(&raw);
        expect_header(&mut decoder);
        let table = expect_table(&mut decoder);
        assert!(matches!(
            decoder.parse_row(&table.columns),
            Err(SliceError::UnknownTypeTag { tag: 0x09 })
        ));
    }

    #[test]
    fn real_fields_round_trip_bits() {
        let mut raw = slice_header_bytes(1);
        put_string(&mut raw, "t");
        put_varint(&mut raw, 1);
        put_string(&mut raw, "r");
        put_varint(&mut raw, 8);
        raw.extend_from_slice(&2.5f64.to_bits().to_be_bytes());
        raw.push(TypeTag::Real as u8);
        raw.push(END_OF_TABLE_DELIMITER);

        let mut decoder = fed_decoder(&raw);
        expect_header(&mut decoder);
        let table = expect_table(&mut decoder);
        match decoder.parse_row(&table.columns).unwrap() {
            RowStep::Row(row) => assert_eq!(row, vec![FieldValue::Real(2.5)]),
            other => panic!("expected row, got {other:?}"),
        }
    }

    #[test]
    fn need_more_data_does_not_advance_offset() {
        let mut raw = slice_header_bytes(1);
        put_string(&mut raw, "tasks");
        put_varint(&mut raw, 1);
        put_string(&mut raw, "id");
        put_text_field(&mut raw, "row-1");
        raw.push(END_OF_TABLE_DELIMITER);

        let compressed = compress(&raw);
        let mut decoder = SliceDecoder::new().unwrap();

        // Feed one compressed byte at a time, asserting the cursor only
        // moves when a parse actually succeeds.
        let mut header = None;
        let mut table: Option<TableHeader> = None;
        let mut row = None;
        for byte in compressed {
            decoder.feed(&[byte]).unwrap();
            if header.is_none() {
                let before = decoder.remaining_bytes();
                match decoder.parse_slice_header().unwrap() {
                    HeaderStep::Header(h) => header = Some(h),
                    HeaderStep::NeedMoreData => {
                        assert_eq!(decoder.remaining_bytes(), before);
                        continue;
                    }
                }
            }
            if table.is_none() {
                match decoder.parse_table_header().unwrap() {
                    TableStep::Table(t) => table = Some(t),
                    TableStep::NeedMoreData => continue,
                    TableStep::EndOfStream => panic!("premature end of stream"),
                }
            }
            if let (Some(t), None) = (&table, &row) {
                match decoder.parse_row(&t.columns).unwrap() {
                    RowStep::Row(r) => row = Some(r),
                    RowStep::NeedMoreData => continue,
                    RowStep::EndOfTable => panic!("premature end of table"),
                }
            }
        }
        assert_eq!(row, Some(vec![FieldValue::Text("row-1".into())]));
        let columns = table.unwrap().columns;
        assert_eq!(decoder.parse_row(&columns).unwrap(), RowStep::EndOfTable);
        assert_eq!(
            decoder.parse_table_header().unwrap(),
            TableStep::EndOfStream
        );
        assert_eq!(decoder.remaining_bytes(), 0);
    }

    #[test]
    fn compaction_is_transparent() {
        let mut raw = slice_header_bytes(1);
        put_string(&mut raw, "t");
        put_varint(&mut raw, 1);
        put_string(&mut raw, "id");
        for i in 0..50 {
            put_text_field(&mut raw, &format!("row-{i}"));
        }
        raw.push(END_OF_TABLE_DELIMITER);

        let mut decoder = fed_decoder(&raw);
        expect_header(&mut decoder);
        let table = expect_table(&mut decoder);
        let mut rows = 0;
        loop {
            decoder.compact_buffer();
            match decoder.parse_row(&table.columns).unwrap() {
                RowStep::Row(_) => rows += 1,
                RowStep::EndOfTable => break,
                RowStep::NeedMoreData => panic!("stream is fully fed"),
            }
        }
        assert_eq!(rows, 50);
        decoder.compact_buffer();
        assert_eq!(
            decoder.parse_table_header().unwrap(),
            TableStep::EndOfStream
        );
    }

    #[test]
    fn garbage_input_is_a_decompression_error() {
        let mut decoder = SliceDecoder::new().unwrap();
        let err = decoder.feed(&[0xde, 0xad, 0xbe, 0xef, 0x01, 0x02]).unwrap_err();
        assert!(matches!(err, SliceError::Decompression { .. }));
    }
}
