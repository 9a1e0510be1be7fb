//! Presentation adapter for the CatSeek engine.
//!
//! [`ChatApp`] owns the engine and the session transcript and turns user
//! actions (send, new chat, exports) into engine calls and rendered text.
//! The terminal REPL and the C ABI in [`ffi`] both drive it.

use std::io::{self, BufRead, Write};
use std::path::Path;

use catseek_core::context::ContextStore;
use catseek_core::export::{
    export_container, export_snapshot, ExportSummary, DEFAULT_CONTAINER_FILE, DEFAULT_SNAPSHOT_FILE,
};
use catseek_core::model::THINKING_PHRASES;
use catseek_core::{Engine, Generation, Result};
use tracing::warn;

pub mod ffi;
pub use ffi::*;

const HISTORY_PREVIEW: usize = 5;

/// One rendered chat turn.
#[derive(Debug, Clone)]
pub struct Reply {
    pub generation: Generation,
    /// Thinking block (if enabled), response and meta line.
    pub text: String,
}

/// Chat session: engine, transcript and display preferences.
pub struct ChatApp {
    engine: Engine,
    history: ContextStore,
    thinking: bool,
}

impl ChatApp {
    pub fn new(engine: Engine, history: ContextStore, thinking: bool) -> Self {
        Self { engine, history, thinking }
    }

    /// Fresh engine with an in-memory transcript.
    pub fn in_memory(thinking: bool) -> Result<Self> {
        Ok(Self::new(Engine::new(), ContextStore::in_memory()?, thinking))
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn history(&self) -> &ContextStore {
        &self.history
    }

    pub fn thinking(&self) -> bool {
        self.thinking
    }

    pub fn set_thinking(&mut self, enabled: bool) {
        self.thinking = enabled;
    }

    /// Run one turn. Blank input is ignored and returns `None`.
    pub fn send_message(&mut self, text: &str) -> Option<Reply> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let mut rendered = String::new();
        if self.thinking {
            rendered.push_str(&render_thinking(&self.engine.quantize_input(text)));
        }

        let generation = self.engine.generate(text);
        rendered.push_str(&render_reply(&generation));

        if let Err(e) = self.history.record_turn(text, &generation) {
            warn!("failed to record chat turn: {}", e);
        }

        Some(Reply { generation, text: rendered })
    }

    /// Start a new chat: clear the transcript and reset the engine.
    pub fn new_session(&mut self) -> Result<()> {
        self.engine.reset();
        self.history.clear_history()
    }

    pub fn export_gguf(&self, path: &Path) -> Result<ExportSummary> {
        export_container(&self.engine, path)
    }

    pub fn export_json(&self, path: &Path) -> Result<()> {
        export_snapshot(&self.engine, path).map(|_| ())
    }

    /// Interactive loop over `input`, writing everything to `out`.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> io::Result<()> {
        let info = self.engine.model_info();
        writeln!(out, "🐱 {} — {}", info.name, info.quantization)?;
        writeln!(out, "=======================================")?;
        writeln!(out, "Type a message, '!help' for commands, 'quit' to exit.")?;
        writeln!(out)?;

        let mut lines = input.lines();
        loop {
            write!(out, "You: ")?;
            out.flush()?;

            let line = match lines.next() {
                Some(line) => line?,
                None => break,
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if matches!(line.to_lowercase().as_str(), "quit" | "exit") {
                writeln!(out, "Goodbye! 👋")?;
                break;
            }

            if line.starts_with('!') {
                let output = self.command(line);
                writeln!(out, "{}", output)?;
                continue;
            }

            if let Some(reply) = self.send_message(line) {
                writeln!(out, "{}", reply.text)?;
            }
        }
        Ok(())
    }

    /// Handle a `!command` line and return what to show.
    pub fn command(&mut self, line: &str) -> String {
        let mut parts = line.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default();
        let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());

        match name {
            "!help" => HELP.to_string(),
            "!new" => match self.new_session() {
                Ok(()) => "💫 Chat cleared. Ready for new conversation.".to_string(),
                Err(e) => {
                    warn!("failed to start a new session: {}", e);
                    format!("❌ Could not start a new chat: {}", e)
                }
            },
            "!thinking" => {
                self.thinking = !self.thinking;
                format!("Thinking process {}", if self.thinking { "shown" } else { "hidden" })
            }
            "!info" => self.render_info(),
            "!stats" => self.render_stats(),
            "!history" => self.render_history(),
            "!export-gguf" => {
                let path = Path::new(arg.unwrap_or(DEFAULT_CONTAINER_FILE));
                match self.export_gguf(path) {
                    Ok(summary) => render_export_summary(&summary),
                    Err(e) => {
                        warn!("GGUF export failed: {}", e);
                        format!("❌ Failed to export: {}", e)
                    }
                }
            }
            "!export-json" => {
                let path = Path::new(arg.unwrap_or(DEFAULT_SNAPSHOT_FILE));
                match self.export_json(path) {
                    Ok(()) => format!("✅ Config exported to: {}", path.display()),
                    Err(e) => {
                        warn!("JSON export failed: {}", e);
                        format!("❌ Failed to export: {}", e)
                    }
                }
            }
            other => format!("Unknown command `{}`. Try !help.", other),
        }
    }

    fn render_info(&self) -> String {
        let info = self.engine.model_info();
        format!(
            "🧠 {}\n   Quantization: {}\n   Parameters: {}\n   Size: {} MB\n   State: {} ({})\n   Tokens: {}\n   Context: {} | Vocab: {}",
            info.name,
            info.quantization,
            info.parameters,
            info.size_mb,
            info.bit_state.bit(),
            info.bit_state,
            info.tokens_processed,
            info.context_length,
            info.vocab_size,
        )
    }

    fn render_stats(&self) -> String {
        match self.history.stats() {
            Ok(stats) => format!(
                "📊 Turns: {} | Message tokens: {} | Database: {} bytes",
                stats.total_turns, stats.total_tokens, stats.db_size_bytes
            ),
            Err(e) => format!("❌ Error retrieving statistics: {}", e),
        }
    }

    fn render_history(&self) -> String {
        match self.history.recent_turns(HISTORY_PREVIEW) {
            Ok(turns) if turns.is_empty() => "No messages yet.".to_string(),
            Ok(turns) => turns
                .iter()
                .enumerate()
                .map(|(i, turn)| {
                    format!(
                        "  {}. You: \"{}\"\n     CatSeek [{}]: \"{}\"",
                        i + 1,
                        truncate(&turn.user_message, 50),
                        turn.mode,
                        turn.response
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => format!("❌ Error reading history: {}", e),
        }
    }
}

const HELP: &str = "Commands:
  !new                 start a new chat
  !thinking            show/hide the thinking process
  !info                model information
  !stats               transcript statistics
  !history             recent messages
  !export-gguf [path]  export the 1-bit model container
  !export-json [path]  export a JSON snapshot
  quit                 leave";

/// `+1`/`-1` tokens separated by spaces.
pub fn format_preview(preview: &[i8]) -> String {
    preview
        .iter()
        .map(|&b| if b == 1 { "+1" } else { "-1" })
        .collect::<Vec<_>>()
        .join(" ")
}

/// The "thinking" block shown before a reply.
pub fn render_thinking(quantized: &[i8]) -> String {
    let preview = &quantized[..quantized.len().min(catseek_core::model::PREVIEW_LEN)];
    let [first, rest @ ..] = THINKING_PHRASES;
    let mut block = String::from("\n  ◐ Thinking...\n");
    block.push_str(&format!("  │ {} [{}...]\n", first, format_preview(preview)));
    for (i, phrase) in rest.iter().enumerate() {
        let branch = if i + 1 == rest.len() { "╰─" } else { "│" };
        block.push_str(&format!("  {} {}\n", branch, phrase));
    }
    block
}

/// Response plus the `1-bit=<mode> | mode=<label>` meta line.
pub fn render_reply(generation: &Generation) -> String {
    format!(
        "\nCatSeek: {}\n\n  ⚡ 1-bit={} | mode={}\n",
        generation.response,
        generation.mode.bit(),
        generation.mode
    )
}

pub fn render_export_summary(summary: &ExportSummary) -> String {
    format!(
        "✅ GGUF Export Successful!\n\n📁 File: {}\n📊 Size: {} bytes\n⚡ Quantization: {}\n🧠 Tensors: {}\n📋 Metadata: {} keys",
        summary.filepath.display(),
        summary.size_bytes,
        summary.quantization,
        summary.tensors,
        summary.metadata_keys
    )
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        s.to_string()
    }
}
