use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use doc_model::{SignerConfig, ViewportMetrics};
use pdf_engine::{default_engine, OpenSource, PdfEngine};
use serde::Serialize;
use signing::{FrameCapture, Severity, SigningSession};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use storage::Storage;
use viewer_core::HeadlessViewport;

mod manifest;

pub use manifest::{parse_size, FieldSpec, Manifest};

#[derive(Debug, Parser)]
#[command(name = "countersign")]
#[command(about = "Place and embed signatures in PDF documents")]
pub struct Cli {
    /// Log debug output to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,
    /// Directory holding signer.json instead of the per-user config dir.
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable PDF metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Embed the fields listed in a manifest and write the signed copy.
    Sign(SignArgs),
    /// Show the signer configuration, updating it when options are given.
    Config {
        #[arg(long)]
        signer_name: Option<String>,
        #[arg(long, value_name = "WxH")]
        field_size: Option<String>,
        #[arg(long)]
        require_complete: Option<bool>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Args)]
struct SignArgs {
    #[arg(value_name = "FILE")]
    file: PathBuf,
    /// JSON manifest of fields, positioned in viewport pixels.
    #[arg(long, value_name = "MANIFEST")]
    fields: PathBuf,
    /// Size of the viewport the field positions refer to.
    #[arg(long, value_name = "WxH", default_value = "612x792")]
    viewport: String,
    /// Rendered view used if the document has to be flattened.
    #[arg(long, value_name = "PNG")]
    frame: Option<PathBuf>,
    /// TrueType font for typed signatures in a flattened copy, instead of
    /// the bundled DejaVu Sans.
    #[arg(long, value_name = "TTF")]
    font: Option<PathBuf>,
    #[arg(long)]
    output: Option<PathBuf>,
    /// Signer name for typed fields without text.
    #[arg(long)]
    signer: Option<String>,
    /// Sign even when some fields are still empty.
    #[arg(long)]
    allow_incomplete: bool,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    first_page_size_pt: PageSizeOutput,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging(cli.verbose);

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Sign(args) => run_sign(args, cli.config_dir.as_deref()),
        Commands::Config { signer_name, field_size, require_complete } => run_config(
            cli.config_dir.as_deref(),
            signer_name,
            field_size.as_deref(),
            require_complete,
        ),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    // A second init in the same process (tests driving `run`) is harmless.
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .try_init();
}

fn open_storage(config_dir: Option<&Path>) -> Result<Storage> {
    match config_dir {
        Some(dir) => Ok(Storage::with_root(dir)),
        None => Storage::from_default_project().context("failed to locate config directory"),
    }
}

fn run_info(file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let mut engine = default_engine();
    let handle = engine.open(OpenSource::from(file)).context("failed to open PDF")?;

    let page_count = engine.page_count(handle)?;
    let size = engine.page_size(handle, 0)?;
    let payload = InfoOutput {
        path: file.display().to_string(),
        page_count,
        first_page_size_pt: PageSizeOutput { width: size.width_pt, height: size.height_pt },
    };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    engine.close(handle)?;

    Ok(())
}

fn run_sign(args: SignArgs, config_dir: Option<&Path>) -> Result<()> {
    ensure_pdf_exists(&args.file)?;

    let mut config = open_storage(config_dir)?
        .load_effective_config()
        .context("failed to load signer configuration")?;
    if let Some(signer) = args.signer {
        config.profile.name = signer;
    }
    if args.allow_incomplete {
        config.require_complete = false;
    }

    let (width, height) = parse_size(&args.viewport).context("invalid --viewport")?;
    let metrics =
        ViewportMetrics::new(width, height).context("viewport size must be positive")?;
    let manifest = Manifest::load(&args.fields)?;

    let bytes = fs::read(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let name = args.file.file_name().map(|name| name.to_string_lossy().into_owned());

    let mut session = SigningSession::new(config.clone());
    session.load_document(bytes, name).context("failed to open PDF")?;

    let mut adapter = HeadlessViewport::new(Some(metrics));
    session.viewport_mut().poll(&adapter);

    let base_dir = args.fields.parent().unwrap_or_else(|| Path::new("."));
    let placed = manifest.place(base_dir, &config, session.store_mut())?;
    log::debug!("placed {placed} field(s) from {}", args.fields.display());

    let mut capture = build_capture(args.frame.as_deref(), args.font.as_deref())?;
    let signed = session.sign(&mut adapter, &mut capture, Instant::now());
    report_notices(&mut session);
    let handle = signed.context("failed to sign document")?;
    session.teardown(&mut adapter);

    let artifact = session
        .artifacts()
        .get(handle)
        .cloned()
        .context("signed document was released before it was written")?;
    let output = args.output.unwrap_or_else(|| args.file.with_file_name(&artifact.filename));
    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(&output, &artifact.bytes)
        .with_context(|| format!("failed to write signed PDF to {}", output.display()))?;
    session.artifacts_mut().release(handle);

    println!("{}", output.display());

    Ok(())
}

fn build_capture(frame: Option<&Path>, font: Option<&Path>) -> Result<FrameCapture> {
    let mut capture = match frame {
        Some(path) => {
            let image = image::open(path)
                .with_context(|| format!("failed to read frame {}", path.display()))?;
            FrameCapture::new(image.to_rgba8())
        }
        None => FrameCapture::blank(),
    };

    if let Some(path) = font {
        let bytes =
            fs::read(path).with_context(|| format!("failed to read font {}", path.display()))?;
        capture = capture
            .with_font_bytes(bytes)
            .with_context(|| format!("invalid font {}", path.display()))?;
    }

    Ok(capture)
}

fn report_notices(session: &mut SigningSession) {
    for notice in session.take_notices() {
        match notice.severity {
            Severity::Info => log::info!("{}: {}", notice.title, notice.message),
            Severity::Warning => log::warn!("{}: {}", notice.title, notice.message),
            Severity::Destructive => log::error!("{}: {}", notice.title, notice.message),
        }
    }
}

fn run_config(
    config_dir: Option<&Path>,
    signer_name: Option<String>,
    field_size: Option<&str>,
    require_complete: Option<bool>,
) -> Result<()> {
    let storage = open_storage(config_dir)?;
    let mut config = storage.load_config().context("failed to load signer configuration")?;
    let changed = signer_name.is_some() || field_size.is_some() || require_complete.is_some();

    if let Some(name) = signer_name {
        config.profile.name = name;
    }
    if let Some(size) = field_size {
        let (width, height) = parse_size(size).context("invalid --field-size")?;
        config = config.with_field_size(width, height);
    }
    if let Some(require) = require_complete {
        config = config.with_require_complete(require);
    }

    if changed {
        storage.save_config(&config).context("failed to save signer configuration")?;
        log::info!("saved {}", storage.config_path().display());
    }

    print_config(&config)
}

fn print_config(config: &SignerConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    println!("{json}");
    Ok(())
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}
