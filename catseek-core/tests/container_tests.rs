use catseek_core::container::{encode_model, encoded_len, write_model, write_model_file};
use catseek_core::{
    Engine, Error, FormatError, MetadataEntry, MetadataValue, ModelContainer, SignTensor,
    TensorLengths, ValidationError,
};
use tempfile::tempdir;

fn sample_metadata() -> Vec<MetadataEntry> {
    vec![
        MetadataEntry::new("general.name", "sample"),
        MetadataEntry::new("answer", -42),
        MetadataEntry::new("emoji", "1-bit ⚡"),
    ]
}

#[test]
fn test_engine_container_round_trip() {
    let engine = Engine::new();
    let metadata = engine.metadata();
    let bytes = encode_model(&metadata, engine.tensors()).unwrap();

    let parsed = ModelContainer::from_bytes(&bytes, &TensorLengths::FromMetadata).unwrap();
    assert_eq!(parsed.version, 3);
    assert_eq!(parsed.metadata, metadata);
    assert_eq!(parsed.tensors, engine.tensors());
    assert_eq!(
        parsed.get("general.name"),
        Some(&MetadataValue::String("CatSeek-1Bit".into()))
    );
}

#[test]
fn test_engine_container_layout() {
    let engine = Engine::new();
    let bytes = encode_model(&engine.metadata(), engine.tensors()).unwrap();

    assert_eq!(bytes.len(), 521);
    assert_eq!(&bytes[..4], b"GGUF");
    assert_eq!(u64::from_le_bytes(bytes[8..16].try_into().unwrap()), 4);
    assert_eq!(u64::from_le_bytes(bytes[16..24].try_into().unwrap()), 11);
    // "out" is last: [1,-1,-1,1,1,-1,-1,1] -> bits 0,3,4,7
    assert_eq!(&bytes[bytes.len() - 12..bytes.len() - 1], b"\x03\0\0\0\0\0\0\0out");
    assert_eq!(bytes[bytes.len() - 1], 0b1001_1001);
}

#[test]
fn test_single_embed_tensor_packs_to_85() {
    let metadata = vec![MetadataEntry::new("k", 1)];
    let tensors = vec![SignTensor::new("embed", vec![1, -1, 1, -1, 1, -1, 1, -1])];
    let bytes = encode_model(&metadata, &tensors).unwrap();
    assert_eq!(bytes.last(), Some(&85));
}

#[test]
fn test_arbitrary_lengths_round_trip() {
    let metadata = sample_metadata();
    let tensors = vec![
        SignTensor::new("short", vec![1, -1, 1]),
        SignTensor::new("long", (0..21).map(|i| if i % 3 == 0 { 1 } else { -1 }).collect()),
        SignTensor::new("empty", vec![]),
        SignTensor::new("byte", vec![1; 8]),
    ];
    let bytes = encode_model(&metadata, &tensors).unwrap();
    assert_eq!(bytes.len(), encoded_len(&metadata, &tensors));

    let lengths = TensorLengths::PerTensor(tensors.iter().map(SignTensor::len).collect());
    let parsed = ModelContainer::from_bytes(&bytes, &lengths).unwrap();
    assert_eq!(parsed.metadata, metadata);
    assert_eq!(parsed.tensors, tensors);
    assert_eq!(parsed.tensor("byte").unwrap().packed(), vec![0xff]);
}

#[test]
fn test_reader_needs_a_length() {
    let metadata = sample_metadata();
    let tensors = vec![SignTensor::new("w", vec![1, -1])];
    let bytes = encode_model(&metadata, &tensors).unwrap();

    assert_eq!(
        ModelContainer::from_bytes(&bytes, &TensorLengths::FromMetadata),
        Err(FormatError::UnknownTensorLength("w".into()))
    );
    // Wrong length leaves bytes unread or runs off the end.
    assert_eq!(
        ModelContainer::from_bytes(&bytes, &TensorLengths::Uniform(9)),
        Err(FormatError::Truncated { offset: bytes.len() - 1, needed: 1 })
    );
    let mut padded = bytes.clone();
    padded.push(0);
    assert_eq!(
        ModelContainer::from_bytes(&padded, &TensorLengths::Uniform(2)),
        Err(FormatError::TrailingBytes(1))
    );
}

#[test]
fn test_reader_rejects_huge_tensor_length() {
    let metadata = vec![MetadataEntry::new("k", 1)];
    let tensors = vec![SignTensor::new("w", vec![1])];
    let bytes = encode_model(&metadata, &tensors).unwrap();
    // header 24, entry 8 + 1 + 4 + 4, tensor name 8 + 1
    assert!(matches!(
        ModelContainer::from_bytes(&bytes, &TensorLengths::Uniform(usize::MAX)),
        Err(FormatError::Truncated { offset: 50, .. })
    ));
    assert!(matches!(
        ModelContainer::from_bytes(&bytes, &TensorLengths::PerTensor(vec![usize::MAX - 3])),
        Err(FormatError::Truncated { offset: 50, .. })
    ));
}

#[test]
fn test_reader_rejects_other_versions() {
    let metadata = vec![MetadataEntry::new("k", 1)];
    let tensors = vec![SignTensor::new("w", vec![1])];
    let mut bytes = encode_model(&metadata, &tensors).unwrap();
    bytes[4..8].copy_from_slice(&2u32.to_le_bytes());
    assert_eq!(
        ModelContainer::from_bytes(&bytes, &TensorLengths::Uniform(1)),
        Err(FormatError::UnsupportedVersion(2))
    );
}

#[test]
fn test_reader_rejects_invalid_utf8_key() {
    let metadata = vec![MetadataEntry::new("k", 1)];
    let tensors = vec![SignTensor::new("w", vec![1])];
    let mut bytes = encode_model(&metadata, &tensors).unwrap();
    // key bytes start after the header and the key length
    bytes[32] = 0xFF;
    assert_eq!(
        ModelContainer::from_bytes(&bytes, &TensorLengths::Uniform(1)),
        Err(FormatError::InvalidUtf8 { offset: 32 })
    );
}

#[test]
fn test_reader_rejects_unknown_type_tag() {
    let metadata = vec![MetadataEntry::new("k", 5)];
    let tensors = vec![SignTensor::new("w", vec![1])];
    let mut bytes = encode_model(&metadata, &tensors).unwrap();
    // type tag sits right after the 1-byte key
    bytes[33..37].copy_from_slice(&6u32.to_le_bytes());
    assert_eq!(
        ModelContainer::from_bytes(&bytes, &TensorLengths::Uniform(1)),
        Err(FormatError::UnknownValueType { key: "k".into(), tag: 6 })
    );
}

#[test]
fn test_validation_error_writes_nothing() {
    let tensors = vec![SignTensor::new("", vec![1, -1])];
    let mut sink = Vec::new();
    let err = write_model(&sample_metadata(), &tensors, &mut sink).unwrap_err();
    assert!(matches!(
        err,
        Error::Validation(ValidationError::EmptyTensorName { index: 0 })
    ));
    assert!(sink.is_empty());
}

#[test]
fn test_validation_error_creates_no_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.gguf");
    let dup = vec![SignTensor::new("w", vec![1]), SignTensor::new("w", vec![-1])];

    let err = write_model_file(&path, &sample_metadata(), &dup).unwrap_err();
    assert!(matches!(
        err,
        Error::Validation(ValidationError::DuplicateTensorName(ref name)) if name == "w"
    ));
    assert!(!path.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_file_write_and_mmap_open() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.gguf");
    let engine = Engine::new();

    let stats = write_model_file(&path, &engine.metadata(), engine.tensors()).unwrap();
    assert_eq!(stats.tensor_count, 4);
    assert_eq!(stats.metadata_count, 11);
    assert_eq!(stats.bytes_written, std::fs::metadata(&path).unwrap().len());

    let parsed = ModelContainer::open(&path, &TensorLengths::default()).unwrap();
    assert_eq!(parsed.tensors, engine.tensors());

    // Writing again replaces the file with identical bytes.
    let before = std::fs::read(&path).unwrap();
    write_model_file(&path, &engine.metadata(), engine.tensors()).unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), before);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn test_missing_directory_is_io_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("no/such/dir/model.gguf");
    let engine = Engine::new();
    let err = write_model_file(&path, &engine.metadata(), engine.tensors()).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert!(!path.exists());
}
