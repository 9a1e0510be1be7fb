//! JSON dump of engine state for inspection.
//!
//! No byte-level contract: any consumer should treat this as an ordinary JSON
//! document. Weights keep the engine's tensor order.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::container::{write_atomically, SignTensor};
use crate::error::Result;
use crate::model::{Engine, Mode, ModelInfo};

pub const SNAPSHOT_FORMAT_VERSION: &str = "1.0";

#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub model: ModelInfo,
    #[serde(serialize_with = "tensor_map")]
    pub weights: Vec<SignTensor>,
    pub responses: BTreeMap<String, Vec<String>>,
    pub exported_at: DateTime<Utc>,
    pub format_version: String,
}

fn tensor_map<S: Serializer>(
    tensors: &[SignTensor],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(tensors.len()))?;
    for tensor in tensors {
        map.serialize_entry(tensor.name(), tensor.values())?;
    }
    map.end()
}

impl Snapshot {
    /// Copy the engine's current state. The engine is not touched.
    pub fn capture(engine: &Engine) -> Self {
        let responses = [Mode::Analytical, Mode::Action]
            .into_iter()
            .map(|mode| (mode.bit().to_string(), engine.responses().pool(mode).to_vec()))
            .collect();
        Self {
            model: engine.model_info(),
            weights: engine.tensors().to_vec(),
            responses,
            exported_at: Utc::now(),
            format_version: SNAPSHOT_FORMAT_VERSION.to_string(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write pretty-printed JSON to `path`, replacing it atomically.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        write_atomically(path, |out| {
            serde_json::to_writer_pretty(out, self)?;
            Ok(())
        })
    }
}
