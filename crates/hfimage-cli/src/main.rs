use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use hfimage_contracts::events::{ActivityEvent, ActivityLog, RequestSummary};
use hfimage_contracts::history::{GenerationRecord, HistoryStore, DEFAULT_PAGE_SIZE};
use hfimage_contracts::models::{ModelRegistry, ModelSelector};
use hfimage_contracts::presets::{preset_by_name, size_label, SIZE_PRESETS};
use hfimage_contracts::request::{
    BearerToken, GenerationRequest, ParameterRanges, DEFAULT_GUIDANCE_SCALE, DEFAULT_HEIGHT,
    DEFAULT_STEPS, DEFAULT_WIDTH,
};
use hfimage_contracts::storage::{ApiKeyStore, FileStore, KeyValueStore};
use hfimage_engine::{EngineConfig, GenerationClient, GenerationOutcome, ImageHandle};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const EXIT_CANCELLED: i32 = 130;

#[derive(Debug, Parser)]
#[command(
    name = "hfimage",
    version,
    about = "Generate images with hosted text-to-image models"
)]
struct Cli {
    /// State directory (defaults to $HFIMAGE_HOME, then ./.hfimage).
    #[arg(long, global = true)]
    home: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Generate(GenerateArgs),
    Models(ModelsArgs),
    Key(KeyArgs),
    History(HistoryArgs),
    Sizes,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    negative_prompt: Option<String>,
    #[arg(long, default_value_t = DEFAULT_WIDTH)]
    width: u32,
    #[arg(long, default_value_t = DEFAULT_HEIGHT)]
    height: u32,
    /// Size preset key or name; overrides --width/--height.
    #[arg(long)]
    size: Option<String>,
    #[arg(long, default_value_t = DEFAULT_STEPS)]
    steps: u32,
    #[arg(long, default_value_t = DEFAULT_GUIDANCE_SCALE)]
    guidance: f64,
    #[arg(long)]
    seed: Option<i64>,
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    no_history: bool,
    #[arg(long)]
    api_key: Option<String>,
}

#[derive(Debug, Parser)]
struct ModelsArgs {
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    api_key: Option<String>,
}

#[derive(Debug, Parser)]
struct KeyArgs {
    #[command(subcommand)]
    action: KeyAction,
}

#[derive(Debug, Subcommand)]
enum KeyAction {
    Set { key: String },
    Show,
    Clear,
}

#[derive(Debug, Parser)]
struct HistoryArgs {
    #[command(subcommand)]
    action: HistoryAction,
}

#[derive(Debug, Subcommand)]
enum HistoryAction {
    List {
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    Clear {
        #[arg(long)]
        yes: bool,
    },
    Export {
        id: String,
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("hfimage error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("HFIMAGE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let workspace = Workspace::resolve(cli.home);
    match cli.command {
        Command::Generate(args) => block_on(run_generate(args, &workspace)),
        Command::Models(args) => block_on(run_models(args, &workspace)),
        Command::Key(args) => run_key(args, &workspace),
        Command::History(args) => run_history(args, &workspace),
        Command::Sizes => {
            print_sizes();
            Ok(0)
        }
    }
}

fn block_on<F: std::future::Future<Output = Result<i32>>>(future: F) -> Result<i32> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?
        .block_on(future)
}

/// On-disk layout for the key/history store, saved images and the
/// activity log.
#[derive(Debug, Clone)]
struct Workspace {
    home: PathBuf,
}

impl Workspace {
    fn resolve(explicit: Option<PathBuf>) -> Self {
        let home = explicit
            .or_else(|| non_empty_env("HFIMAGE_HOME").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(".hfimage"));
        Self { home }
    }

    fn store(&self) -> FileStore {
        FileStore::new(self.home.join("store.json"))
    }

    fn images_dir(&self) -> PathBuf {
        self.home.join("images")
    }

    fn activity(&self) -> ActivityLog {
        ActivityLog::new(
            self.home.join("events.jsonl"),
            format!("session-{}", compact_timestamp()),
        )
    }
}

async fn run_generate(args: GenerateArgs, workspace: &Workspace) -> Result<i32> {
    let token = resolve_api_key(
        args.api_key.as_deref(),
        non_empty_env("HF_API_TOKEN").as_deref(),
        &ApiKeyStore::new(workspace.store()),
    )?;
    let selection = ModelSelector::new(None)
        .select(args.model.as_deref())
        .map_err(anyhow::Error::msg)?;
    if let Some(reason) = selection.fallback_reason.as_deref() {
        info!(model = %selection.model_id, "{reason}");
    }
    let (width, height) = resolve_dimensions(args.size.as_deref(), args.width, args.height)?;

    let mut request = GenerationRequest::new(selection.model_id, args.prompt, token)
        .with_size(width, height)
        .with_steps(args.steps)
        .with_guidance_scale(args.guidance)
        .with_seed(args.seed);
    if let Some(negative_prompt) = args.negative_prompt {
        request = request.with_negative_prompt(negative_prompt);
    }
    for warning in ParameterRanges::default().check(&request) {
        eprintln!("Note: {warning}");
    }

    let client = GenerationClient::new(EngineConfig::from_env())?;
    let activity = workspace.activity();
    activity.record(ActivityEvent::GenerationStarted {
        request: RequestSummary::from(&request),
    })?;
    eprintln!(
        "Generating {}x{} image with {} (Ctrl-C to cancel)...",
        request.width, request.height, request.model_id
    );

    let ticket = client.begin()?;
    let mut progress = ProgressLine::default();
    let outcome = {
        let mut report = |percent: u8| progress.update(percent);
        let run = ticket.run(&request, Some(&mut report));
        tokio::pin!(run);
        tokio::select! {
            outcome = &mut run => outcome,
            _ = tokio::signal::ctrl_c() => {
                client.cancel();
                run.await
            }
        }
    };
    progress.finish();

    match outcome {
        GenerationOutcome::Success(image) => {
            let path = keep_image(
                &image,
                &request,
                args.out.as_deref(),
                !args.no_history,
                workspace,
                &activity,
            )?;

            match image.dimensions() {
                Ok((w, h)) => println!(
                    "Saved {} ({w}x{h}, {} bytes, {})",
                    path.display(),
                    image.len(),
                    image.mime_type()
                ),
                Err(err) => {
                    debug!(error = %err, "could not read image dimensions");
                    println!(
                        "Saved {} ({} bytes, {})",
                        path.display(),
                        image.len(),
                        image.mime_type()
                    )
                }
            }
            Ok(0)
        }
        GenerationOutcome::Cancelled => {
            activity.record(ActivityEvent::GenerationCancelled {
                request: RequestSummary::from(&request),
            })?;
            println!("Generation cancelled.");
            Ok(EXIT_CANCELLED)
        }
        GenerationOutcome::Failure(err) => {
            activity.record(ActivityEvent::GenerationFailed {
                request: RequestSummary::from(&request),
                error: err.to_string(),
                status: err.status(),
            })?;
            eprintln!("Generation failed: {err}");
            Ok(1)
        }
    }
}

async fn run_models(args: ModelsArgs, workspace: &Workspace) -> Result<i32> {
    let Some(query) = args.search.filter(|query| !query.trim().is_empty()) else {
        let registry = ModelRegistry::default();
        let default_id = registry.default_model().map(|model| model.id.clone());
        for model in registry.list() {
            let marker = if Some(&model.id) == default_id.as_ref() {
                " (default)"
            } else {
                ""
            };
            println!("{:<45} {}{marker}", model.id, model.display_name());
        }
        return Ok(0);
    };

    let token = resolve_api_key(
        args.api_key.as_deref(),
        non_empty_env("HF_API_TOKEN").as_deref(),
        &ApiKeyStore::new(workspace.store()),
    )?;
    let client = GenerationClient::new(EngineConfig::from_env())?;
    let models = client
        .search_models(&query, &token)
        .await
        .context("Failed to search models. Please check your API key and try again.")?;
    if models.is_empty() {
        println!("No image models matched '{}'.", query.trim());
        return Ok(0);
    }
    for model in models {
        println!(
            "{:<50} {:<15} likes={} downloads={}",
            model.id,
            model.pipeline_tag.as_deref().unwrap_or("-"),
            model.likes.unwrap_or_default(),
            model.downloads.unwrap_or_default()
        );
    }
    Ok(0)
}

fn run_key(args: KeyArgs, workspace: &Workspace) -> Result<i32> {
    let mut keys = ApiKeyStore::new(workspace.store());
    match args.action {
        KeyAction::Set { key } => {
            if key.trim().is_empty() {
                bail!("API key must not be empty");
            }
            keys.set(&key)?;
            workspace.activity().record(ActivityEvent::ApiKeySaved)?;
            println!("API key saved.");
        }
        KeyAction::Show => match keys.get()? {
            Some(key) => println!("{}", mask_key(&key)),
            None => println!("No API key saved."),
        },
        KeyAction::Clear => {
            keys.clear()?;
            println!("API key removed.");
        }
    }
    Ok(0)
}

fn run_history(args: HistoryArgs, workspace: &Workspace) -> Result<i32> {
    let mut history = HistoryStore::new(workspace.store());
    match args.action {
        HistoryAction::List { page } => {
            let pages = history.page_count(DEFAULT_PAGE_SIZE)?;
            if pages == 0 {
                println!("No images generated yet. Your history will appear here.");
                return Ok(0);
            }
            let page = page.clamp(1, pages);
            for record in history.page(page, DEFAULT_PAGE_SIZE)? {
                println!("{}", format_record(&record));
            }
            println!("Page {page} of {pages}");
        }
        HistoryAction::Clear { yes } => {
            if !yes
                && !confirm(
                    "Are you sure you want to clear your generation history? This cannot be undone.",
                )?
            {
                println!("History kept.");
                return Ok(0);
            }
            history.clear()?;
            workspace.activity().record(ActivityEvent::HistoryCleared)?;
            println!("History cleared.");
        }
        HistoryAction::Export { id, out } => {
            let Some(record) = history.find(&id)? else {
                bail!("no history entry with id {id}");
            };
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&record.url, &out)
                .with_context(|| format!("failed to copy {} to {}", record.url, out.display()))?;
            println!("Exported {}", out.display());
        }
    }
    Ok(0)
}

fn print_sizes() {
    for preset in SIZE_PRESETS {
        println!("{:<14} {}", preset.key, preset.name);
    }
}

fn resolve_api_key<S: KeyValueStore>(
    explicit: Option<&str>,
    from_env: Option<&str>,
    stored: &ApiKeyStore<S>,
) -> Result<BearerToken> {
    let candidate = explicit
        .or(from_env)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);
    if let Some(key) = candidate {
        return Ok(BearerToken::new(key));
    }
    match stored.get()? {
        Some(key) => Ok(BearerToken::new(key)),
        None => bail!(
            "API key required: pass --api-key, set HF_API_TOKEN, or run `hfimage key set <KEY>`"
        ),
    }
}

fn resolve_dimensions(size: Option<&str>, width: u32, height: u32) -> Result<(u32, u32)> {
    let Some(size) = size else {
        return Ok((width, height));
    };
    let Some(preset) = preset_by_name(size) else {
        let known: Vec<&str> = SIZE_PRESETS.iter().map(|preset| preset.key).collect();
        bail!("unknown size preset '{size}' (expected one of: {})", known.join(", "));
    };
    Ok((preset.width, preset.height))
}

fn save_image(image: &ImageHandle, out: Option<&Path>, workspace: &Workspace) -> Result<PathBuf> {
    let (dir, filename) = match out {
        Some(out) => {
            let Some(filename) = out.file_name().and_then(|name| name.to_str()) else {
                bail!("--out must name a file ({})", out.display());
            };
            (
                out.parent().unwrap_or_else(|| Path::new(".")).to_path_buf(),
                filename.to_string(),
            )
        }
        None => (
            workspace.images_dir(),
            image.default_filename(Utc::now().timestamp_millis()),
        ),
    };
    image
        .save(&dir, &filename)
        .with_context(|| format!("failed to write {}", dir.join(&filename).display()))
}

/// Saves the image, appends it to history and logs the success. A failure
/// here is logged as a failed generation before it propagates.
fn keep_image(
    image: &ImageHandle,
    request: &GenerationRequest,
    out: Option<&Path>,
    record_history: bool,
    workspace: &Workspace,
    activity: &ActivityLog,
) -> Result<PathBuf> {
    let kept = save_image(image, out, workspace).and_then(|path| {
        if record_history {
            HistoryStore::new(workspace.store()).append(GenerationRecord::from_request(
                request,
                path.to_string_lossy(),
                image.mime_type(),
                image.len() as u64,
            ))?;
        }
        Ok(path)
    });
    let path = match kept {
        Ok(path) => path,
        Err(err) => {
            activity.record(ActivityEvent::GenerationFailed {
                request: RequestSummary::from(request),
                error: format!("{err:#}"),
                status: None,
            })?;
            return Err(err);
        }
    };
    activity.record(ActivityEvent::GenerationSucceeded {
        request: RequestSummary::from(request),
        path: path.to_string_lossy().into_owned(),
        bytes: image.len() as u64,
        mime_type: image.mime_type().to_string(),
    })?;
    Ok(path)
}

fn format_record(record: &GenerationRecord) -> String {
    let when = DateTime::<Utc>::from_timestamp_millis(record.timestamp)
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{}  {}  {}  {}x{} ({})  {}",
        record.id,
        when,
        record.model_id,
        record.width,
        record.height,
        size_label(record.width, record.height),
        record.prompt
    )
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{visible}", "*".repeat(chars.len() - 4))
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Single-line percentage readout on stderr.
#[derive(Debug, Default)]
struct ProgressLine {
    last: Option<u8>,
}

impl ProgressLine {
    fn update(&mut self, percent: u8) {
        if self.last == Some(percent) {
            return;
        }
        self.last = Some(percent);
        let mut stderr = io::stderr();
        let _ = write!(stderr, "\rDownloading image... {percent:>3}%");
        let _ = stderr.flush();
    }

    fn finish(&mut self) {
        if self.last.take().is_some() {
            eprintln!();
        }
    }
}

fn compact_timestamp() -> String {
    Utc::now().format("%Y%m%dT%H%M%S").to_string()
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
