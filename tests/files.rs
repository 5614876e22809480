mod support;

use docmap::{bag, FilesExt, MongoConfig, OdmError, StorageKind, Value};
use support::Attachment;

#[test]
fn grid_storage_round_trips_payloads() {
    let conn = support::connect();
    let files = conn.files::<Attachment>().unwrap();
    assert_eq!(files.storage_kind(), StorageKind::Grid);

    let payload = b"%PDF-1.4 pretend this is a report".to_vec();
    let stored = files
        .store(bag! { "filename" => "report.pdf" }, &payload)
        .unwrap();
    assert!(stored.document().id().is_some());
    assert_eq!(
        stored.document().get("length"),
        Some(Value::Int(payload.len() as i64))
    );

    let found = files
        .find_one(&bag! { "filename" => "report.pdf" })
        .unwrap()
        .unwrap();
    assert_eq!(files.bytes(&found).unwrap(), payload);

    assert!(files.delete(&found).unwrap());
    assert!(files
        .find_one(&bag! { "filename" => "report.pdf" })
        .unwrap()
        .is_none());
}

#[test]
fn filesystem_storage_writes_next_to_the_record() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = MongoConfig::with_database("app");
    config
        .storage
        .insert("attachments".to_string(), dir.path().to_path_buf());
    let conn = support::connect_with_config(config);

    let files = conn.files::<Attachment>().unwrap();
    assert_eq!(files.storage_kind(), StorageKind::Filesystem);

    let payload = b"column_a,column_b\n1,2\n".to_vec();
    let stored = files
        .store(bag! { "id" => 1, "filename" => "export.csv" }, &payload)
        .unwrap();

    let path = files.path(&stored).unwrap();
    assert_eq!(path, dir.path().join("export.csv"));
    assert_eq!(std::fs::read(&path).unwrap(), payload);
    assert_eq!(files.bytes(&stored).unwrap(), payload);

    // The record itself is an ordinary document in the collection.
    let found = files
        .find_one(&bag! { "filename" => "export.csv" })
        .unwrap()
        .unwrap();
    assert_eq!(found.document().get("id"), Some(Value::Int(1)));

    assert!(files.delete(&found).unwrap());
    assert!(!path.exists());
    assert!(files
        .find_one(&bag! { "filename" => "export.csv" })
        .unwrap()
        .is_none());
}

#[test]
fn filesystem_records_without_a_filename_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = MongoConfig::with_database("app");
    config
        .storage
        .insert("attachments".to_string(), dir.path().to_path_buf());
    let conn = support::connect_with_config(config);

    let files = conn.files::<Attachment>().unwrap();
    let err = files.store(bag! { "id" => 9 }, b"payload").unwrap_err();
    assert!(matches!(err, OdmError::Configuration(_)));
}

#[test]
fn delete_still_drops_the_record_when_the_payload_is_already_gone() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = MongoConfig::with_database("app");
    config
        .storage
        .insert("attachments".to_string(), dir.path().to_path_buf());
    let conn = support::connect_with_config(config);

    let files = conn.files::<Attachment>().unwrap();
    let stored = files
        .store(bag! { "id" => 3, "filename" => "orphan.bin" }, b"bytes")
        .unwrap();
    std::fs::remove_file(dir.path().join("orphan.bin")).unwrap();

    assert!(files.delete(&stored).unwrap());
    assert!(files
        .find_one(&bag! { "filename" => "orphan.bin" })
        .unwrap()
        .is_none());
}

#[test]
fn delete_keeps_the_record_when_the_payload_cannot_be_removed() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = MongoConfig::with_database("app");
    config
        .storage
        .insert("attachments".to_string(), dir.path().to_path_buf());
    let conn = support::connect_with_config(config);

    let files = conn.files::<Attachment>().unwrap();
    let stored = files
        .store(bag! { "id" => 4, "filename" => "stuck.bin" }, b"bytes")
        .unwrap();

    // A directory in the payload's place makes remove_file fail.
    std::fs::remove_file(dir.path().join("stuck.bin")).unwrap();
    std::fs::create_dir(dir.path().join("stuck.bin")).unwrap();

    let err = files.delete(&stored).unwrap_err();
    assert!(matches!(err, OdmError::Operation { .. }));
    assert!(files
        .find_one(&bag! { "filename" => "stuck.bin" })
        .unwrap()
        .is_some());
}

#[test]
fn missing_payloads_surface_as_operation_errors() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = MongoConfig::with_database("app");
    config
        .storage
        .insert("attachments".to_string(), dir.path().to_path_buf());
    let conn = support::connect_with_config(config);

    let files = conn.files::<Attachment>().unwrap();
    let stored = files
        .store(bag! { "id" => 2, "filename" => "gone.bin" }, b"bytes")
        .unwrap();
    std::fs::remove_file(dir.path().join("gone.bin")).unwrap();

    let err = files.bytes(&stored).unwrap_err();
    assert!(matches!(err, OdmError::Operation { .. }));
}
