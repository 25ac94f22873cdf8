use std::fs::{self, OpenOptions};
use std::path::Path;

use bagslice_storage::bag::{INDEX_FILE, MAX_FRAME_LEN, RECORDS_FILE};
use bagslice_storage::{
    Channel, FileStore, MetadataProvider, Record, Storage, StorageError, StorageFilter, TimeBounds,
};
use tempfile::TempDir;

fn write_sample(store: &FileStore, dir: &Path) {
    let mut writer = store.open_writer(dir).expect("open writer");
    writer
        .declare_channel(&Channel::new("/a", "T1", 0))
        .expect("declare /a");
    writer
        .declare_channel(&Channel::new("/b", "T2", 0))
        .expect("declare /b");
    for ts in 0..10i64 {
        let channel = if ts % 2 == 0 { "/a" } else { "/b" };
        writer
            .write(&Record::new(channel, vec![ts as u8; 3], 100 + ts))
            .expect("write record");
    }
    writer.finish().expect("finish");
}

fn read_all(store: &FileStore, dir: &Path, filter: &StorageFilter) -> Vec<Record> {
    let mut reader = store.open_reader(dir, filter).expect("open reader");
    let mut records = Vec::new();
    while reader.has_next().expect("has_next") {
        records.push(reader.read_next().expect("read_next"));
    }
    records
}

#[test]
fn test_metadata_reflects_written_records() {
    let temp = TempDir::new().expect("temp dir");
    let bag = temp.path().join("bag");
    let store = FileStore::new();
    write_sample(&store, &bag);

    let channels = store.list_channels(&bag).unwrap();
    assert_eq!(channels.len(), 2);
    assert_eq!(channels[0].name, "/a");
    assert_eq!(channels[0].type_name, "T1");
    assert_eq!(channels[0].message_count, 5);
    assert_eq!(channels[1].message_count, 5);
    assert_eq!(store.time_bounds(&bag).unwrap(), TimeBounds::new(100, 109));
}

#[test]
fn test_reader_preserves_order_and_filters() {
    let temp = TempDir::new().expect("temp dir");
    let bag = temp.path().join("bag");
    let store = FileStore::new();
    write_sample(&store, &bag);

    let all = read_all(&store, &bag, &StorageFilter::default());
    let stamps: Vec<i64> = all.iter().map(|r| r.timestamp_ns).collect();
    assert_eq!(stamps, (100..110).collect::<Vec<_>>());
    assert_eq!(all[3].payload, vec![3u8; 3]);

    let only_b = read_all(&store, &bag, &StorageFilter::new(["/b"]));
    assert_eq!(only_b.len(), 5);
    assert!(only_b.iter().all(|r| r.channel == "/b"));
}

#[test]
fn test_missing_or_garbled_index_is_not_found() {
    let temp = TempDir::new().expect("temp dir");
    let store = FileStore::new();

    let err = store.list_channels(temp.path()).unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));

    fs::write(temp.path().join(INDEX_FILE), "not json").unwrap();
    let err = store.time_bounds(temp.path()).unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}

#[test]
fn test_truncated_records_are_corrupt() {
    let temp = TempDir::new().expect("temp dir");
    let bag = temp.path().join("bag");
    let store = FileStore::new();
    write_sample(&store, &bag);

    let records = bag.join(RECORDS_FILE);
    let len = fs::metadata(&records).unwrap().len();
    OpenOptions::new()
        .write(true)
        .open(&records)
        .unwrap()
        .set_len(len - 2)
        .unwrap();

    let mut reader = store.open_reader(&bag, &StorageFilter::default()).unwrap();
    let mut result = Ok(true);
    for _ in 0..10 {
        result = reader.has_next();
        if result.is_err() {
            break;
        }
        reader.read_next().unwrap();
    }
    assert!(matches!(result, Err(StorageError::Corrupt(_))));
}

#[test]
fn test_existing_bag_is_not_overwritten() {
    let temp = TempDir::new().expect("temp dir");
    let bag = temp.path().join("bag");
    let store = FileStore::new();
    write_sample(&store, &bag);

    let err = store.open_writer(&bag).err().expect("writer must be refused");
    assert!(matches!(err, StorageError::AlreadyExists(_)));
}

#[test]
fn test_unfinished_bag_has_no_index() {
    let temp = TempDir::new().expect("temp dir");
    let bag = temp.path().join("bag");
    let store = FileStore::new();

    let mut writer = store.open_writer(&bag).unwrap();
    writer.declare_channel(&Channel::new("/a", "T1", 0)).unwrap();
    writer.write(&Record::new("/a", vec![1], 1)).unwrap();
    drop(writer);

    assert!(bag.join(RECORDS_FILE).exists());
    assert!(matches!(
        store.list_channels(&bag),
        Err(StorageError::NotFound(_))
    ));
}

#[test]
fn test_oversized_record_is_refused_and_bag_stays_readable() {
    let temp = TempDir::new().expect("temp dir");
    let bag = temp.path().join("bag");
    let store = FileStore::new();

    let mut writer = store.open_writer(&bag).unwrap();
    writer.declare_channel(&Channel::new("/a", "T1", 0)).unwrap();

    let err = writer
        .write(&Record::new("/a", vec![0u8; MAX_FRAME_LEN + 1], 1))
        .unwrap_err();
    assert!(matches!(err, StorageError::RecordTooLarge { .. }));

    writer.write(&Record::new("/a", vec![7], 2)).unwrap();
    writer.finish().unwrap();

    let records = read_all(&store, &bag, &StorageFilter::default());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].payload, vec![7]);
    assert_eq!(store.list_channels(&bag).unwrap()[0].message_count, 1);
    assert_eq!(store.time_bounds(&bag).unwrap(), TimeBounds::new(2, 2));
}
