//! Core of the CatSeek 1-bit chat demo.
//!
//! The engine picks canned replies from a two-state machine; the container
//! module writes its metadata and sign tensors in a small GGUF-style format.

pub mod container;
pub mod context;
pub mod error;
pub mod export;
pub mod model;
pub mod snapshot;

pub use container::{
    encode_model, write_model, write_model_file, MetadataEntry, MetadataValue, ModelContainer,
    SignTensor, TensorLengths, WriteStats,
};
pub use error::{Error, FormatError, Result, ValidationError};
pub use model::{Engine, Generation, Mode, ModelCard, ModelInfo};
