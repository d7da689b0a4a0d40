//! Full-stack bridge tests: host surface down to SQLite and back.

use brookdb_bridge::DatabaseBridge;
use brookdb_codec::{FieldValue, TypeTag};
use brookdb_platform::{
    DeviceProfile, HttpResponse, MockDownloader, MockHttpClient, MockMemoryAlertSource,
};
use brookdb_sqlite::{ConnectionTag, SingleConnectionPool};
use brookdb_sync::PushCompletion;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;

struct Host {
    bridge: Arc<DatabaseBridge>,
    pool: Arc<SingleConnectionPool>,
    http: Arc<MockHttpClient>,
    downloader: Arc<MockDownloader>,
}

fn host() -> Host {
    let pool = Arc::new(SingleConnectionPool::open_in_memory(ConnectionTag(1)).unwrap());
    pool.connection()
        .lock()
        .execute_batch(
            "CREATE TABLE bridge_tasks (id TEXT PRIMARY KEY, name TEXT, _status TEXT);
             CREATE TABLE local_storage (key TEXT PRIMARY KEY, value TEXT);",
        )
        .unwrap();

    let http = MockHttpClient::new();
    let downloader = MockDownloader::new();
    let bridge = DatabaseBridge::new(
        Arc::clone(&pool) as _,
        Arc::clone(&http) as _,
        Arc::clone(&downloader) as _,
        MockMemoryAlertSource::new(),
        DeviceProfile::default(),
    );
    Host {
        bridge,
        pool,
        http,
        downloader,
    }
}

#[test]
fn exec_sql_round_trips_typed_values() {
    let h = host();
    h.bridge
        .exec_sql_query(
            1,
            "INSERT INTO bridge_tasks (id, name, _status) VALUES (?, ?, ?)",
            vec![
                FieldValue::Text("t1".into()),
                FieldValue::Text("Alpha".into()),
                FieldValue::Text("created".into()),
            ],
        )
        .unwrap();

    let records = h
        .bridge
        .exec_sql_query(
            1,
            "SELECT id, name FROM bridge_tasks WHERE id = ?",
            vec![FieldValue::Text("t1".into())],
        )
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["name"], FieldValue::Text("Alpha".into()));
}

#[test]
fn query_uses_the_identity_cache() {
    let h = host();
    h.pool
        .connection()
        .lock()
        .execute_batch("INSERT INTO bridge_tasks VALUES ('a', 'One', 'synced')")
        .unwrap();

    let sql = "SELECT id, name FROM bridge_tasks";
    let first = h.bridge.query(1, "bridge_tasks", sql).unwrap();
    assert_eq!(first[0].len(), 2);

    let second = h.bridge.query(1, "bridge_tasks", sql).unwrap();
    assert_eq!(second[0].len(), 1, "second read returns id only");
}

#[test]
fn unknown_tag_is_rejected() {
    let h = host();
    let err = h.bridge.query(9, "bridge_tasks", "SELECT id FROM bridge_tasks");
    assert!(err.is_err());
    assert!(err.unwrap_err().to_string().contains('9'));
}

#[test]
fn sync_applies_payload_and_advances_watermark() {
    let h = host();
    h.bridge.configure_sync(
        "{\"pullEndpointUrl\":\"https://h/pull?sequenceId=seq-0\",\"connectionTag\":1}",
    );

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let listener_id = h
        .bridge
        .add_sync_listener(Arc::new(move |event| sink.lock().push(event.to_string())));

    let push_calls = Arc::new(Mutex::new(0usize));
    let push_count = Arc::clone(&push_calls);
    h.bridge
        .set_push_changes_provider(Arc::new(move |completion: PushCompletion| {
            *push_count.lock() += 1;
            completion(true, "");
        }));

    // An array body carries no `next`, so pagination ends after one page.
    h.http.push_response(HttpResponse::ok(
        200,
        r#"[{"table":"bridge_tasks","id":"s1","name":"FromSync","sequenceId":"seq-7"}]"#,
    ));
    h.bridge.sync_database("test").unwrap();

    assert_eq!(*push_calls.lock(), 1);
    assert_eq!(h.bridge.sync_state_json(), "{\"state\":\"done\"}");

    let conn = h.pool.connection();
    let conn = conn.lock();
    let name: String = conn
        .query_row(
            "SELECT name FROM bridge_tasks WHERE id = 's1'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(name, "FromSync");

    let watermark: String = conn
        .query_row(
            "SELECT value FROM local_storage WHERE key = '__watermelon_last_sequence_id'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(watermark, "seq-7");

    assert!(events
        .lock()
        .iter()
        .any(|e| e == "{\"type\":\"state\",\"state\":\"done\"}"));
    h.bridge.remove_sync_listener(listener_id);
}

#[test]
fn apply_errors_fail_the_sync_run() {
    let h = host();
    h.bridge
        .configure_sync("{\"pullEndpointUrl\":\"https://h/pull\",\"connectionTag\":1}");
    h.http.push_response(HttpResponse::ok(
        200,
        r#"[{"table":"bridge_tasks","id":"x","not_a_column":1}]"#,
    ));

    let err = h.bridge.sync_database("bad-payload").unwrap_err();
    assert!(err.to_string().contains("not_a_column"), "got: {err}");
    assert_eq!(h.bridge.sync_state_json(), "{\"state\":\"error\"}");
}

#[test]
fn removed_listeners_stop_receiving() {
    let h = host();
    h.bridge
        .configure_sync("{\"pullEndpointUrl\":\"https://h/pull\",\"connectionTag\":1}");

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let id = h
        .bridge
        .add_sync_listener(Arc::new(move |event| sink.lock().push(event.to_string())));
    h.bridge.remove_sync_listener(id);

    h.http.push_response(HttpResponse::ok(200, "{}"));
    let _ = h.bridge.sync_database("quiet");
    assert!(events.lock().is_empty());
}

#[test]
fn imports_a_slice_through_the_bridge() {
    let h = host();

    let mut raw = Vec::new();
    let put_varint = |out: &mut Vec<u8>, mut value: u64| loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    };
    let put_string = |out: &mut Vec<u8>, s: &str| {
        put_varint(out, s.len() as u64);
        out.extend_from_slice(s.as_bytes());
    };
    put_string(&mut raw, "bridge-slice");
    put_varint(&mut raw, 1);
    put_string(&mut raw, "high");
    put_varint(&mut raw, 1);
    put_varint(&mut raw, 1);
    put_string(&mut raw, "bridge_tasks");
    put_varint(&mut raw, 2);
    put_string(&mut raw, "id");
    put_string(&mut raw, "name");
    for (id, name) in [("t1", "Alpha")] {
        for text in [id, name] {
            put_varint(&mut raw, text.len() as u64);
            raw.extend_from_slice(text.as_bytes());
            raw.push(TypeTag::Text as u8);
        }
    }
    raw.push(0xff);
    h.downloader
        .set_payload(&zstd::encode_all(raw.as_slice(), 3).unwrap(), 16);

    h.bridge
        .import_remote_slice_sync(1, "https://cdn.example.com/slice.zst")
        .unwrap();

    let conn = h.pool.connection();
    let conn = conn.lock();
    let (name, status): (String, String) = conn
        .query_row(
            "SELECT name, _status FROM bridge_tasks WHERE id = 't1'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(name, "Alpha");
    assert_eq!(status, "synced");
}

#[test]
fn decompress_zstd_whole_file() {
    let h = host();
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("payload.zst");
    let dest = dir.path().join("payload.bin");

    let original = b"brookdb whole-file decompression";
    let compressed = zstd::encode_all(&original[..], 3).unwrap();
    std::fs::File::create(&src)
        .unwrap()
        .write_all(&compressed)
        .unwrap();

    h.bridge.decompress_zstd(&src, &dest).unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), original);
}
