//! Simplified GGUF-style container for 1-bit sign tensors.
//!
//! # Format
//!
//! ```text
//! [MAGIC: 4 bytes "GGUF"]
//! [VERSION: u32 LE]
//! [TENSOR_COUNT: u64 LE]
//! [METADATA_COUNT: u64 LE]
//! [METADATA_i: key_len(u64) + key + type(u32) + value]
//!     type 4 (INT32):  i32
//!     type 8 (STRING): len(u64) + utf-8
//! [TENSOR_i: name_len(u64) + name + packed signs]
//! ```
//!
//! Sign packing: 8 values per byte, bit `i` of byte `k` is set iff element
//! `8k + i` is +1. Unused high bits of the last byte stay zero. The layout
//! carries no element count, so a reader has to learn tensor lengths
//! elsewhere (see [`TensorLengths`]).

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use memmap2::MmapOptions;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{FormatError, Result, ValidationError};

pub const MAGIC: &[u8; 4] = b"GGUF";
pub const VERSION: u32 = 3;

/// Type tag for a signed 32-bit metadata value.
pub const TYPE_INT32: u32 = 4;
/// Type tag for a length-prefixed UTF-8 metadata value.
pub const TYPE_STRING: u32 = 8;

/// Metadata key the reader falls back on for tensor lengths.
pub const EMBEDDING_LENGTH_KEY: &str = "catseek.embedding_length";

const HEADER_LEN: usize = 4 + 4 + 8 + 8;

/// A metadata value; the variant decides the type tag on disk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Int32(i32),
    String(String),
}

impl MetadataValue {
    pub fn type_tag(&self) -> u32 {
        match self {
            MetadataValue::Int32(_) => TYPE_INT32,
            MetadataValue::String(_) => TYPE_STRING,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            MetadataValue::Int32(v) => Some(*v),
            MetadataValue::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Int32(_) => None,
            MetadataValue::String(s) => Some(s),
        }
    }

    fn encoded_len(&self) -> usize {
        match self {
            MetadataValue::Int32(_) => 4,
            MetadataValue::String(s) => 8 + s.len(),
        }
    }
}

impl From<i32> for MetadataValue {
    fn from(v: i32) -> Self {
        MetadataValue::Int32(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataEntry {
    pub key: String,
    pub value: MetadataValue,
}

impl MetadataEntry {
    pub fn new(key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        Self { key: key.into(), value: value.into() }
    }
}

/// Named sequence of sign weights.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignTensor {
    name: String,
    values: Vec<i8>,
}

impl SignTensor {
    /// Values are checked by the writer, not here.
    pub fn new(name: impl Into<String>, values: Vec<i8>) -> Self {
        Self { name: name.into(), values }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[i8] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn packed(&self) -> Vec<u8> {
        pack_signs(&self.values)
    }
}

/// Pack sign values into 1 bit each, 8 values per byte, LSB first.
/// Encoding: 1 = +1, 0 = anything else.
pub fn pack_signs(values: &[i8]) -> Vec<u8> {
    let mut packed = vec![0u8; packed_len(values.len())];
    for (i, &v) in values.iter().enumerate() {
        if v == 1 {
            packed[i / 8] |= 1 << (i % 8);
        }
    }
    packed
}

/// Inverse of [`pack_signs`]. Bits past the end of `packed` read as -1.
pub fn unpack_signs(packed: &[u8], len: usize) -> Vec<i8> {
    (0..len)
        .map(|i| match packed.get(i / 8) {
            Some(byte) if (byte >> (i % 8)) & 1 == 1 => 1,
            _ => -1,
        })
        .collect()
}

/// Number of bytes needed to pack `len` signs.
pub fn packed_len(len: usize) -> usize {
    len.div_ceil(8)
}

/// Exact number of bytes [`write_model`] produces for these inputs.
pub fn encoded_len(metadata: &[MetadataEntry], tensors: &[SignTensor]) -> usize {
    let meta: usize = metadata
        .iter()
        .map(|e| 8 + e.key.len() + 4 + e.value.encoded_len())
        .sum();
    let weights: usize = tensors
        .iter()
        .map(|t| 8 + t.name.len() + packed_len(t.len()))
        .sum();
    HEADER_LEN + meta + weights
}

/// Check keys, names and sign values before anything is written.
pub fn validate(
    metadata: &[MetadataEntry],
    tensors: &[SignTensor],
) -> std::result::Result<(), ValidationError> {
    if metadata.is_empty() {
        return Err(ValidationError::NoMetadata);
    }
    if tensors.is_empty() {
        return Err(ValidationError::NoTensors);
    }

    let mut keys = HashSet::with_capacity(metadata.len());
    for (index, entry) in metadata.iter().enumerate() {
        if entry.key.is_empty() {
            return Err(ValidationError::EmptyKey { index });
        }
        if !keys.insert(entry.key.as_str()) {
            return Err(ValidationError::DuplicateKey(entry.key.clone()));
        }
    }

    let mut names = HashSet::with_capacity(tensors.len());
    for (index, tensor) in tensors.iter().enumerate() {
        if tensor.name.is_empty() {
            return Err(ValidationError::EmptyTensorName { index });
        }
        if !names.insert(tensor.name.as_str()) {
            return Err(ValidationError::DuplicateTensorName(tensor.name.clone()));
        }
        if let Some((index, &value)) = tensor
            .values
            .iter()
            .enumerate()
            .find(|&(_, &v)| v != 1 && v != -1)
        {
            return Err(ValidationError::NotASign {
                tensor: tensor.name.clone(),
                index,
                value,
            });
        }
    }
    Ok(())
}

/// Statistics returned by a successful write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct WriteStats {
    pub bytes_written: u64,
    pub tensor_count: usize,
    pub metadata_count: usize,
}

/// Forwards to `inner` while counting accepted bytes.
struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

fn write_str<W: Write>(out: &mut W, s: &str) -> std::io::Result<()> {
    out.write_all(&(s.len() as u64).to_le_bytes())?;
    out.write_all(s.as_bytes())
}

/// Serialize `metadata` and `tensors` into `sink`.
///
/// Inputs are validated first; on a [`ValidationError`] the sink is untouched.
pub fn write_model<W: Write>(
    metadata: &[MetadataEntry],
    tensors: &[SignTensor],
    sink: W,
) -> Result<WriteStats> {
    validate(metadata, tensors)?;

    let mut out = CountingWriter { inner: sink, count: 0 };

    // Header
    out.write_all(MAGIC)?;
    out.write_all(&VERSION.to_le_bytes())?;
    out.write_all(&(tensors.len() as u64).to_le_bytes())?;
    out.write_all(&(metadata.len() as u64).to_le_bytes())?;

    for entry in metadata {
        write_str(&mut out, &entry.key)?;
        out.write_all(&entry.value.type_tag().to_le_bytes())?;
        match &entry.value {
            MetadataValue::Int32(v) => out.write_all(&v.to_le_bytes())?,
            MetadataValue::String(s) => write_str(&mut out, s)?,
        }
    }

    for tensor in tensors {
        write_str(&mut out, &tensor.name)?;
        out.write_all(&tensor.packed())?;
    }
    out.flush()?;

    debug_assert_eq!(out.count as usize, encoded_len(metadata, tensors));
    debug!(
        bytes = out.count,
        tensors = tensors.len(),
        metadata = metadata.len(),
        "container encoded"
    );

    Ok(WriteStats {
        bytes_written: out.count,
        tensor_count: tensors.len(),
        metadata_count: metadata.len(),
    })
}

/// Encode into a fresh buffer.
pub fn encode_model(metadata: &[MetadataEntry], tensors: &[SignTensor]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(encoded_len(metadata, tensors));
    write_model(metadata, tensors, &mut buf)?;
    Ok(buf)
}

/// Write a container file at `path`, replacing any existing file.
///
/// Bytes go to a temporary file next to `path` that is renamed into place
/// only after a complete flush; on any failure the temporary file is removed
/// and `path` is left as it was.
pub fn write_model_file(
    path: &Path,
    metadata: &[MetadataEntry],
    tensors: &[SignTensor],
) -> Result<WriteStats> {
    validate(metadata, tensors)?;
    let stats = write_atomically(path, |out| write_model(metadata, tensors, out))?;
    debug!(path = %path.display(), bytes = stats.bytes_written, "container persisted");
    Ok(stats)
}

/// Run `body` against a buffered temporary file in `path`'s directory, then
/// move the file over `path`.
pub(crate) fn write_atomically<T>(
    path: &Path,
    body: impl FnOnce(&mut BufWriter<NamedTempFile>) -> Result<T>,
) -> Result<T> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut writer = BufWriter::new(NamedTempFile::new_in(dir)?);
    let value = body(&mut writer)?;
    let tmp = writer.into_inner().map_err(|e| e.into_error())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(value)
}

/// How the reader learns each tensor's element count.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TensorLengths {
    /// Use the int32 `catseek.embedding_length` metadata entry for every tensor.
    #[default]
    FromMetadata,
    /// Every tensor has this many elements.
    Uniform(usize),
    /// One count per tensor, in file order.
    PerTensor(Vec<usize>),
}

/// A parsed container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelContainer {
    pub version: u32,
    pub metadata: Vec<MetadataEntry>,
    pub tensors: Vec<SignTensor>,
}

impl ModelContainer {
    pub fn from_bytes(
        bytes: &[u8],
        lengths: &TensorLengths,
    ) -> std::result::Result<Self, FormatError> {
        let mut cur = Cursor { bytes, offset: 0 };

        let magic: [u8; 4] = cur.array()?;
        if &magic != MAGIC {
            return Err(FormatError::BadMagic(magic));
        }
        let version = cur.u32()?;
        if version != VERSION {
            return Err(FormatError::UnsupportedVersion(version));
        }
        let tensor_count = cur.len()?;
        let metadata_count = cur.len()?;

        let mut metadata = Vec::new();
        for _ in 0..metadata_count {
            let key = cur.string()?;
            let value = match cur.u32()? {
                TYPE_INT32 => MetadataValue::Int32(cur.i32()?),
                TYPE_STRING => MetadataValue::String(cur.string()?),
                tag => return Err(FormatError::UnknownValueType { key, tag }),
            };
            metadata.push(MetadataEntry { key, value });
        }

        let uniform = match lengths {
            TensorLengths::Uniform(n) => Some(*n),
            TensorLengths::FromMetadata => metadata
                .iter()
                .find(|e| e.key == EMBEDDING_LENGTH_KEY)
                .and_then(|e| e.value.as_i32())
                .and_then(|n| usize::try_from(n).ok()),
            TensorLengths::PerTensor(_) => None,
        };

        let mut tensors = Vec::new();
        for index in 0..tensor_count {
            let name = cur.string()?;
            let len = match lengths {
                TensorLengths::PerTensor(counts) => counts.get(index).copied(),
                _ => uniform,
            }
            .ok_or_else(|| FormatError::UnknownTensorLength(name.clone()))?;
            let packed = cur.take(packed_len(len))?;
            tensors.push(SignTensor::new(name, unpack_signs(packed, len)));
        }

        let rest = bytes.len() - cur.offset;
        if rest != 0 {
            return Err(FormatError::TrailingBytes(rest));
        }

        Ok(Self { version, metadata, tensors })
    }

    /// Map a container file read-only and parse it.
    pub fn open(path: &Path, lengths: &TensorLengths) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        Ok(Self::from_bytes(&mmap[..], lengths)?)
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.metadata.iter().find(|e| e.key == key).map(|e| &e.value)
    }

    pub fn tensor(&self, name: &str) -> Option<&SignTensor> {
        self.tensors.iter().find(|t| t.name == name)
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> std::result::Result<&'a [u8], FormatError> {
        let available = self.bytes.len() - self.offset;
        if n > available {
            return Err(FormatError::Truncated { offset: self.offset, needed: n - available });
        }
        let slice = &self.bytes[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> std::result::Result<[u8; N], FormatError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u32(&mut self) -> std::result::Result<u32, FormatError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn i32(&mut self) -> std::result::Result<i32, FormatError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn len(&mut self) -> std::result::Result<usize, FormatError> {
        let raw = u64::from_le_bytes(self.array()?);
        usize::try_from(raw).map_err(|_| FormatError::LengthOverflow(raw))
    }

    fn string(&mut self) -> std::result::Result<String, FormatError> {
        let len = self.len()?;
        let start = self.offset;
        let raw = self.take(len)?;
        std::str::from_utf8(raw)
            .map(str::to_string)
            .map_err(|_| FormatError::InvalidUtf8 { offset: start })
    }
}
