use anyhow::{Context, Result};
use catseek_app::{render_export_summary, ChatApp};
use catseek_core::context::ContextStore;
use catseek_core::export::{export_container, export_snapshot, DEFAULT_CONTAINER_FILE, DEFAULT_SNAPSHOT_FILE};
use catseek_core::{Engine, MetadataValue, ModelContainer, TensorLengths};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "CatSeek 1-bit chat demo")]
struct Args {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat (default)
    Chat {
        /// SQLite file for the transcript; in memory when omitted
        #[arg(long)]
        history: Option<PathBuf>,

        /// Hide the thinking process
        #[arg(long)]
        no_thinking: bool,
    },
    /// Write a fresh engine's 1-bit container
    ExportGguf {
        #[arg(long, default_value = DEFAULT_CONTAINER_FILE)]
        out: PathBuf,
    },
    /// Write a fresh engine's JSON snapshot
    ExportJson {
        #[arg(long, default_value = DEFAULT_SNAPSHOT_FILE)]
        out: PathBuf,
    },
    /// Print the contents of a container file
    Inspect {
        path: PathBuf,

        /// Elements per tensor; read from metadata when omitted
        #[arg(long)]
        tensor_len: Option<usize>,
    },
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn chat(history: Option<PathBuf>, thinking: bool) -> Result<()> {
    let store = match &history {
        Some(path) => ContextStore::new(path)
            .with_context(|| format!("failed to open transcript at {}", path.display()))?,
        None => ContextStore::in_memory()?,
    };
    let mut app = ChatApp::new(Engine::new(), store, thinking);
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    app.run(stdin.lock(), &mut stdout)?;
    Ok(())
}

fn inspect(path: PathBuf, tensor_len: Option<usize>) -> Result<()> {
    let lengths = match tensor_len {
        Some(n) => TensorLengths::Uniform(n),
        None => TensorLengths::FromMetadata,
    };
    let container = ModelContainer::open(&path, &lengths)
        .with_context(|| format!("failed to read {}", path.display()))?;

    println!("📦 {} (version {})", path.display(), container.version);
    println!("📋 Metadata ({} keys):", container.metadata.len());
    for entry in &container.metadata {
        match &entry.value {
            MetadataValue::Int32(v) => println!("   {} = {} (int32)", entry.key, v),
            MetadataValue::String(s) => println!("   {} = \"{}\" (string)", entry.key, s),
        }
    }
    println!("🧠 Tensors ({}):", container.tensors.len());
    for tensor in &container.tensors {
        println!("   {:<8} [{}]", tensor.name(), catseek_app::format_preview(tensor.values()));
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    match args.command.unwrap_or(Command::Chat { history: None, no_thinking: false }) {
        Command::Chat { history, no_thinking } => chat(history, !no_thinking)?,
        Command::ExportGguf { out } => {
            let summary = export_container(&Engine::new(), &out)?;
            println!("{}", render_export_summary(&summary));
        }
        Command::ExportJson { out } => {
            export_snapshot(&Engine::new(), &out)?;
            println!("✅ Config exported to: {}", out.display());
        }
        Command::Inspect { path, tensor_len } => inspect(path, tensor_len)?,
    }
    Ok(())
}
