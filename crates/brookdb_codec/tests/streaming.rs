//! Chunk-splitting equivalence for the streaming slice decoder.
//!
//! Feeding a well-formed stream in any chunk pattern must produce the same
//! parsed tables and rows as feeding it whole.

use brookdb_codec::{
    FieldValue, HeaderStep, RowStep, SliceDecoder, TableStep, TypeTag, END_OF_TABLE_DELIMITER,
};

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

fn put_text(out: &mut Vec<u8>, s: &str) {
    put_varint(out, s.len() as u64);
    out.extend_from_slice(s.as_bytes());
    out.push(TypeTag::Text as u8);
}

fn put_int(out: &mut Vec<u8>, v: i64) {
    put_varint(out, 8);
    out.extend_from_slice(&v.to_be_bytes());
    out.push(TypeTag::Int as u8);
}

fn put_blob(out: &mut Vec<u8>, bytes: &[u8]) {
    put_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
    out.push(TypeTag::Blob as u8);
}

fn fixture_slice() -> Vec<u8> {
    let mut raw = Vec::new();
    put_string(&mut raw, "fixture");
    put_varint(&mut raw, 2);
    put_string(&mut raw, "normal");
    put_varint(&mut raw, 12345);
    put_varint(&mut raw, 3);

    // tasks(id, name, position)
    put_string(&mut raw, "tasks");
    put_varint(&mut raw, 3);
    for col in ["id", "name", "position"] {
        put_string(&mut raw, col);
    }
    for i in 0..40i64 {
        put_text(&mut raw, &format!("t{i}"));
        put_text(&mut raw, &format!("Task {i}"));
        put_int(&mut raw, i);
    }
    raw.push(END_OF_TABLE_DELIMITER);

    // attachments(id, payload) with NULLs and blobs
    put_string(&mut raw, "attachments");
    put_varint(&mut raw, 2);
    put_string(&mut raw, "id");
    put_string(&mut raw, "payload");
    for i in 0..10u8 {
        put_text(&mut raw, &format!("a{i}"));
        if i % 2 == 0 {
            put_blob(&mut raw, &[i, i, i]);
        } else {
            put_varint(&mut raw, 0);
            raw.push(0x00);
        }
    }
    raw.push(END_OF_TABLE_DELIMITER);

    // empty(id)
    put_string(&mut raw, "empty");
    put_varint(&mut raw, 1);
    put_string(&mut raw, "id");
    raw.push(END_OF_TABLE_DELIMITER);

    raw
}

type ParsedTable = (String, Vec<String>, Vec<Vec<FieldValue>>);

fn parse_all(chunks: &[&[u8]]) -> Vec<ParsedTable> {
    let mut decoder = SliceDecoder::new().unwrap();
    let mut tables: Vec<ParsedTable> = Vec::new();
    let mut header_done = false;
    let mut current: Option<ParsedTable> = None;
    let mut done = false;

    let mut step = |decoder: &mut SliceDecoder,
                    tables: &mut Vec<ParsedTable>,
                    current: &mut Option<ParsedTable>,
                    header_done: &mut bool,
                    done: &mut bool| {
        loop {
            if !*header_done {
                match decoder.parse_slice_header().unwrap() {
                    HeaderStep::Header(_) => *header_done = true,
                    HeaderStep::NeedMoreData => return,
                }
            }
            if let Some(table) = current.as_mut() {
                let columns = table.1.clone();
                loop {
                    match decoder.parse_row(&columns).unwrap() {
                        RowStep::Row(row) => table.2.push(row),
                        RowStep::NeedMoreData => return,
                        RowStep::EndOfTable => break,
                    }
                }
                tables.push(current.take().unwrap());
            }
            match decoder.parse_table_header().unwrap() {
                TableStep::Table(t) => {
                    *current = Some((t.table_name, t.columns, Vec::new()));
                }
                TableStep::NeedMoreData => return,
                TableStep::EndOfStream => {
                    *done = true;
                    return;
                }
            }
        }
    };

    for chunk in chunks {
        decoder.feed(chunk).unwrap();
        step(
            &mut decoder,
            &mut tables,
            &mut current,
            &mut header_done,
            &mut done,
        );
        decoder.compact_buffer();
    }
    step(
        &mut decoder,
        &mut tables,
        &mut current,
        &mut header_done,
        &mut done,
    );

    assert!(done, "stream should reach EndOfStream");
    assert!(decoder.is_end_of_stream());
    assert_eq!(decoder.remaining_bytes(), 0);
    tables
}

#[test]
fn chunk_patterns_are_equivalent() {
    let raw = fixture_slice();
    let compressed = zstd::encode_all(raw.as_slice(), 3).unwrap();

    let whole = parse_all(&[compressed.as_slice()]);
    assert_eq!(whole.len(), 3);
    assert_eq!(whole[0].2.len(), 40);
    assert_eq!(whole[1].2.len(), 10);
    assert!(whole[2].2.is_empty());

    for chunk_size in [1, 2, 7, 64, 1024] {
        let chunks: Vec<&[u8]> = compressed.chunks(chunk_size).collect();
        let split = parse_all(&chunks);
        assert_eq!(split, whole, "chunk size {chunk_size} diverged");
    }
}

#[test]
fn declared_count_parses_exactly_that_many_tables() {
    let raw = fixture_slice();
    let compressed = zstd::encode_all(raw.as_slice(), 3).unwrap();
    let tables = parse_all(&[compressed.as_slice()]);
    let names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
    assert_eq!(names, ["tasks", "attachments", "empty"]);
}
