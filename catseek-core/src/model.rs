use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::container::{MetadataEntry, SignTensor};
use crate::error::{Error, Result};

/// Number of quantized elements returned as a preview by [`Engine::generate`].
pub const PREVIEW_LEN: usize = 8;

/// Static description of the model, exported as metadata and model info.
#[derive(Clone, Debug)]
pub struct ModelCard {
    /// Display name.
    pub name: String,
    /// Architecture string written to `general.architecture`.
    pub architecture: String,
    /// Quantization label shown in model info.
    pub quantization: String,
    /// Quantization type written to `quantization.type`.
    pub quantization_type: String,
    /// Nominal size in megabytes.
    pub size_mb: f64,
    /// Maximum context length.
    pub context_length: i32,
    /// Vocabulary size.
    pub vocab_size: i32,
    /// Number of blocks.
    pub block_count: i32,
    /// Number of attention heads.
    pub head_count: i32,
    /// Tokenizer model name.
    pub tokenizer: String,
}

impl Default for ModelCard {
    fn default() -> Self {
        Self {
            name: "CatSeek-1Bit".to_string(),
            architecture: "catseek".to_string(),
            quantization: "1-bit (BitNet)".to_string(),
            quantization_type: "BitNet-1bit".to_string(),
            size_mb: 0.000001,
            context_length: 2048,
            vocab_size: 256,
            block_count: 1,
            head_count: 1,
            tokenizer: "gpt2".to_string(),
        }
    }
}

/// The engine's two-valued state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    #[default]
    Analytical = 0,
    Action = 1,
}

impl Mode {
    pub fn bit(self) -> u8 {
        self as u8
    }

    pub fn flipped(self) -> Self {
        match self {
            Mode::Analytical => Mode::Action,
            Mode::Action => Mode::Analytical,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Mode::Analytical => "Analytical",
            Mode::Action => "Action",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Mode {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.bit())
    }
}

/// Canned replies, one pool per [`Mode`].
#[derive(Clone, Debug)]
pub struct ResponsePools {
    pools: [Vec<String>; 2],
}

impl ResponsePools {
    /// Both pools must hold at least one line.
    pub fn new(analytical: Vec<String>, action: Vec<String>) -> Result<Self> {
        if analytical.is_empty() {
            return Err(Error::EmptyResponsePool(Mode::Analytical));
        }
        if action.is_empty() {
            return Err(Error::EmptyResponsePool(Mode::Action));
        }
        Ok(Self { pools: [analytical, action] })
    }

    pub fn pool(&self, mode: Mode) -> &[String] {
        &self.pools[mode.index()]
    }
}

impl Default for ResponsePools {
    fn default() -> Self {
        let lines = |l: &[&str]| -> Vec<String> { l.iter().map(|s| s.to_string()).collect() };
        Self {
            pools: [
                lines(&[
                    "Let me analyze that systematically. 🔍",
                    "Breaking this down step by step... 📊",
                    "Here's the logical approach: 🧠",
                    "Processing with precision. ⚡",
                    "Quantized inference complete. 💎",
                ]),
                lines(&[
                    "Execute immediately. Let's ship it. 🚀",
                    "Clear path forward — taking action. ⚡",
                    "Optimized solution incoming. 🎯",
                    "1-bit precision, maximum efficiency. 💪",
                    "Compressed wisdom, expanded results. 🌟",
                ]),
            ],
        }
    }
}

/// Narrative steps shown while a reply is "computed".
pub const THINKING_PHRASES: [&str; 5] = [
    "Quantizing input tokens...",
    "Running 1-bit matrix multiplication...",
    "Applying BitNet attention...",
    "Compressing activations...",
    "Generating response...",
];

/// Map each character to +1 if its code point is odd, else -1.
pub fn quantize_input(text: &str) -> Vec<i8> {
    text.chars()
        .map(|c| if (c as u32) % 2 == 1 { 1 } else { -1 })
        .collect()
}

/// XOR fold of the quantized input against cycled `weights`; always 0 or 1.
///
/// Empty `weights` folds to 0.
pub fn forward_pass(quantized: &[i8], weights: &[i8]) -> u8 {
    if weights.is_empty() {
        return 0;
    }
    let acc = quantized
        .iter()
        .zip(weights.iter().cycle())
        .fold(0i32, |acc, (&q, &w)| acc ^ (i32::from(q) * i32::from(w) + 1).div_euclid(2));
    acc.rem_euclid(2) as u8
}

/// Result of one chat turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Generation {
    pub response: String,
    /// Mode used to pick the response (the mode before the flip).
    pub mode: Mode,
    /// First [`PREVIEW_LEN`] quantized input elements.
    pub preview: Vec<i8>,
    /// Output bit of the forward pass. Not used for selection.
    pub output_bit: u8,
}

/// Snapshot of the engine's public statistics.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub quantization: String,
    pub parameters: usize,
    pub size_mb: f64,
    pub bit_state: Mode,
    pub tokens_processed: u64,
    pub context_length: i32,
    pub vocab_size: i32,
}

/// Deterministic two-state reply generator holding four 1-bit tensors.
#[derive(Clone, Debug)]
pub struct Engine {
    card: ModelCard,
    tensors: Vec<SignTensor>,
    responses: ResponsePools,
    mode: Mode,
    token_count: u64,
}

impl Default for Engine {
    fn default() -> Self {
        Self::with_responses(ModelCard::default(), ResponsePools::default())
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(card: ModelCard, responses: ResponsePools) -> Self {
        let tensors = vec![
            SignTensor::new("embed", vec![1, -1, 1, -1, 1, -1, 1, -1]),
            SignTensor::new("attn", vec![1, 1, -1, -1, 1, 1, -1, -1]),
            SignTensor::new("ffn", vec![-1, 1, -1, 1, -1, 1, -1, 1]),
            SignTensor::new("out", vec![1, -1, -1, 1, 1, -1, -1, 1]),
        ];
        Self {
            card,
            tensors,
            responses,
            mode: Mode::Analytical,
            token_count: 0,
        }
    }

    pub fn card(&self) -> &ModelCard {
        &self.card
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn token_count(&self) -> u64 {
        self.token_count
    }

    pub fn tensors(&self) -> &[SignTensor] {
        &self.tensors
    }

    pub fn responses(&self) -> &ResponsePools {
        &self.responses
    }

    pub fn tensor(&self, name: &str) -> Option<&SignTensor> {
        self.tensors.iter().find(|t| t.name() == name)
    }

    pub fn quantize_input(&self, text: &str) -> Vec<i8> {
        quantize_input(text)
    }

    /// Fold `quantized` against the `embed` tensor.
    pub fn forward_pass(&self, quantized: &[i8]) -> u8 {
        let embed = self.tensor("embed").map(SignTensor::values).unwrap_or(&[]);
        forward_pass(quantized, embed)
    }

    /// Produce the reply for `text` and flip the mode.
    pub fn generate(&mut self, text: &str) -> Generation {
        self.token_count += text.split_whitespace().count() as u64;

        let mut quantized = self.quantize_input(text);
        let output_bit = self.forward_pass(&quantized);

        let mode = self.mode;
        let pool = self.responses.pool(mode);
        let response = pool[text.chars().count() % pool.len()].clone();

        self.mode = mode.flipped();
        debug!(
            mode = mode.bit(),
            output_bit,
            tokens = self.token_count,
            "generated reply"
        );

        quantized.truncate(PREVIEW_LEN);
        Generation { response, mode, preview: quantized, output_bit }
    }

    /// Back to Analytical with a zero token counter.
    pub fn reset(&mut self) {
        self.mode = Mode::Analytical;
        self.token_count = 0;
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: self.card.name.clone(),
            quantization: self.card.quantization.clone(),
            parameters: self.tensors.iter().map(SignTensor::len).sum(),
            size_mb: self.card.size_mb,
            bit_state: self.mode,
            tokens_processed: self.token_count,
            context_length: self.card.context_length,
            vocab_size: self.card.vocab_size,
        }
    }

    /// Ordered metadata written into exported containers.
    pub fn metadata(&self) -> Vec<MetadataEntry> {
        let card = &self.card;
        let embedding_length = self.tensor("embed").map_or(0, SignTensor::len) as i32;
        vec![
            MetadataEntry::new("general.architecture", card.architecture.as_str()),
            MetadataEntry::new("general.name", card.name.as_str()),
            MetadataEntry::new("general.quantization_version", 1),
            MetadataEntry::new(format!("{}.bits", card.architecture), 1),
            MetadataEntry::new(format!("{}.context_length", card.architecture), card.context_length),
            MetadataEntry::new(format!("{}.embedding_length", card.architecture), embedding_length),
            MetadataEntry::new(format!("{}.block_count", card.architecture), card.block_count),
            MetadataEntry::new(format!("{}.attention.head_count", card.architecture), card.head_count),
            MetadataEntry::new(format!("{}.vocab_size", card.architecture), card.vocab_size),
            MetadataEntry::new("tokenizer.ggml.model", card.tokenizer.as_str()),
            MetadataEntry::new("quantization.type", card.quantization_type.as_str()),
        ]
    }
}
