//! CLI binary for formlift.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractorConfig` and prints results.

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use formlift::{
    suggest_from_image, ColorAnalysisResponse, ColorExtractor, ColorFailure, ColorPalette,
    Document, ExtractionProgressCallback, ExtractorConfig, LogoClient, PaletteSource, Provider,
    ReqwestTransport, SchemaExtractor, COLOR_KEYS,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

/// A truecolor swatch followed by the hex code.
fn swatch(hex: &str) -> String {
    let rgb = u32::from_str_radix(hex.trim_start_matches('#'), 16).unwrap_or(0);
    let (r, g, b) = ((rgb >> 16) & 0xFF, (rgb >> 8) & 0xFF, rgb & 0xFF);
    format!("\x1b[48;2;{r};{g};{b}m    \x1b[0m {hex}")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner driven by the schema extraction stages.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_render_start(&self) {
        self.bar.set_prefix("Rendering");
        self.bar.set_message("rasterising pages…");
    }

    fn on_render_complete(&self, rendered: usize, total: usize) {
        let mark = if rendered == total { green("✓") } else { red("⚠") };
        self.bar
            .println(format!("  {} {}/{} page(s) rendered", mark, rendered, total));
    }

    fn on_model_call(&self, provider: &str, payload_bytes: usize) {
        self.bar.set_prefix("Extracting");
        self.bar.set_message(format!(
            "waiting for {provider}  {}",
            dim(&format!("{:.2} MB sent", payload_bytes as f64 / (1024.0 * 1024.0)))
        ));
    }

    fn on_extraction_complete(&self, form_id: &str) {
        self.bar.finish_and_clear();
        eprintln!("{} schema {}", green("✔"), bold(form_id));
    }

    fn on_extraction_error(&self, _error: &str) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract a form schema (stdout)
  formlift schema enrollment.pdf

  # Use Gemini and write to a file
  formlift schema --provider google enrollment.pdf -o enrollment.schema.json

  # Brand colors from a website screenshot (vision model)
  formlift colors --url https://example.com

  # Brand colors from a PDF brochure
  formlift colors --pdf brochure.pdf --json

  # Histogram palette, no model involved
  formlift palette --url https://example.com
  formlift palette --image screenshot.png

  # Company logo URL
  formlift logo https://www.example.com

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY       Anthropic API key (provider: claude)
  GEMINI_API_KEY          Google API key (provider: google); GOOGLE_API_KEY also works
  ANTHROPIC_MODEL         Override the Claude model
  GEMINI_MODEL            Override the Gemini model
  SCREENSHOTONE_API_KEY   Screenshot capture access key (colors/palette --url)
  LOGO_DEV_TOKEN          Logo lookup token (logo)
  PDFIUM_LIB_PATH         Directory or file of an existing libpdfium
"#;

/// Extract form schemas and brand palettes using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "formlift",
    version,
    about = "Extract form schemas and brand palettes from PDFs and websites using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Output structured JSON.
    #[arg(long, global = true, env = "FORMLIFT_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "FORMLIFT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "FORMLIFT_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract a JSON form schema from a PDF form.
    Schema {
        /// PDF file to analyse.
        input: PathBuf,

        /// Model provider.
        #[arg(long, value_enum, env = "FORMLIFT_PROVIDER", default_value = "claude")]
        provider: ProviderArg,

        /// Write the schema to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Rendering DPI (72–400).
        #[arg(long, env = "FORMLIFT_DPI", default_value_t = 150,
              value_parser = clap::value_parser!(u32).range(72..=400))]
        dpi: u32,

        /// Disable the progress spinner.
        #[arg(long)]
        no_progress: bool,
    },

    /// Brand colors via the vision model, from a website or a PDF.
    #[command(group(ArgGroup::new("source").required(true).args(["url", "pdf"])))]
    Colors {
        /// Website to capture.
        #[arg(long)]
        url: Option<String>,

        /// PDF to send as a document.
        #[arg(long)]
        pdf: Option<PathBuf>,

        /// Vision provider.
        #[arg(long, value_enum, env = "FORMLIFT_PROVIDER", default_value = "claude")]
        provider: ProviderArg,

        /// Include the base64 screenshot in JSON output.
        #[arg(long)]
        preview: bool,
    },

    /// Histogram palette of a website screenshot or an image file.
    #[command(group(ArgGroup::new("source").required(true).args(["url", "image"])))]
    Palette {
        /// Website to capture.
        #[arg(long)]
        url: Option<String>,

        /// Image file (PNG or JPEG).
        #[arg(long)]
        image: Option<PathBuf>,
    },

    /// Look up the logo of a website.
    Logo {
        /// Website URL or bare domain.
        url: String,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ProviderArg {
    Claude,
    Google,
}

impl From<ProviderArg> for Provider {
    fn from(v: ProviderArg) -> Self {
        match v {
            ProviderArg::Claude => Provider::Claude,
            ProviderArg::Google => Provider::Google,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters during a schema run,
    // so library INFO logs are suppressed while it is active.
    let spinner = matches!(cli.command, Command::Schema { no_progress: false, .. })
        && !cli.quiet
        && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || spinner {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let base = ExtractorConfig::from_env().context("Invalid environment configuration")?;

    match cli.command {
        Command::Schema {
            ref input,
            provider,
            ref output,
            dpi,
            ..
        } => {
            let mut config = base;
            config.dpi = dpi;
            run_schema(&cli, config, input, provider.into(), output.as_deref(), spinner).await
        }
        Command::Colors {
            ref url,
            ref pdf,
            provider,
            preview,
        } => {
            let mut config = base;
            config.vision_provider = provider.into();
            let extractor =
                ColorExtractor::from_config(config).context("Failed to build HTTP client")?;
            let result = match (url, pdf) {
                (Some(url), _) => extractor.from_url(url).await,
                (None, Some(path)) => {
                    let doc = Document::from_path(path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    extractor.from_document(&doc).await
                }
                (None, None) => anyhow::bail!("Pass --url or a file source"),
            };
            print_colors(&cli, result, preview)
        }
        Command::Palette { ref url, ref image } => {
            let result = match (url, image) {
                (Some(url), _) => {
                    let extractor =
                        ColorExtractor::from_config(base).context("Failed to build HTTP client")?;
                    extractor.suggest_from_url(url).await
                }
                (None, Some(path)) => {
                    let bytes = tokio::fs::read(path)
                        .await
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    Ok(suggest_from_image(&bytes))
                }
                (None, None) => anyhow::bail!("Pass --url or a file source"),
            };
            print_colors(&cli, result, false)
        }
        Command::Logo { ref url } => {
            let transport = Arc::new(ReqwestTransport::new().context("Failed to build HTTP client")?);
            let client = LogoClient::new(transport, Arc::new(base));
            if !client.is_ready() {
                anyhow::bail!("Logo lookup is not configured. Set LOGO_DEV_TOKEN.");
            }
            match client.fetch(url).await {
                Some(logo) => {
                    if cli.json {
                        println!("{}", serde_json::json!({ "logoUrl": logo }));
                    } else {
                        println!("{logo}");
                    }
                    Ok(())
                }
                None => anyhow::bail!("No logo found for {url}"),
            }
        }
    }
}

async fn run_schema(
    cli: &Cli,
    config: ExtractorConfig,
    input: &Path,
    provider: Provider,
    output: Option<&Path>,
    spinner: bool,
) -> Result<()> {
    let document = Document::from_path(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let mut extractor = SchemaExtractor::from_config(config).context("Invalid configuration")?;
    if spinner {
        extractor = extractor.with_progress(CliProgressCallback::new());
    }

    let result = extractor
        .extract(&document, provider)
        .await
        .context("Schema extraction failed")?;

    let text = if cli.json {
        serde_json::to_string_pretty(&result).context("Failed to serialise output")?
    } else {
        // The schema parsed once already; pretty-print it for humans.
        serde_json::from_str::<serde_json::Value>(&result.schema)
            .and_then(|v| serde_json::to_string_pretty(&v))
            .unwrap_or_else(|_| result.schema.clone())
    };

    match output {
        Some(path) => {
            write_atomic(path, text.as_bytes())
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if !cli.quiet {
                eprintln!(
                    "{}  {} page(s)  confidence {}%  →  {}",
                    green("✔"),
                    result.pages_sent,
                    result.confidence,
                    bold(&path.display().to_string())
                );
            }
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(text.as_bytes())
                .context("Failed to write to stdout")?;
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet && !cli.json {
        for skipped in &result.skipped_pages {
            eprintln!("  {} {}", red("✗"), skipped);
        }
        if let Some(summary) = result.summary {
            eprintln!(
                "   {}",
                dim(&format!(
                    "{} field(s), {} required, {} page(s), {} section(s)",
                    summary.field_count,
                    summary.required_count,
                    summary.page_count,
                    summary.section_count
                ))
            );
        }
        eprintln!("   {}", dim(&result.notes));
    }
    Ok(())
}

/// Write via a sibling temp file and rename so readers never see a partial file.
async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

fn print_colors(
    cli: &Cli,
    result: Result<ColorPalette, ColorFailure>,
    preview: bool,
) -> Result<()> {
    if cli.json {
        let mut response = ColorAnalysisResponse::from(result);
        if !preview {
            response.screenshot_base64 = None;
        }
        println!(
            "{}",
            serde_json::to_string_pretty(&response).context("Failed to serialise output")?
        );
        return Ok(());
    }

    let palette = match result {
        Ok(p) => p,
        Err(f) if f.blocked => anyhow::bail!("{} (site blocked)", f.message),
        Err(f) => anyhow::bail!("{}", f.message),
    };

    let labelled = palette.source() == PaletteSource::Vision;
    for (i, color) in palette.colors().iter().enumerate() {
        if labelled {
            println!("{:<16} {}", COLOR_KEYS[i], swatch(color));
        } else {
            println!("{:<16} {}", format!("color {}", i + 1), swatch(color));
        }
    }
    if !cli.quiet {
        let source = match palette.source() {
            PaletteSource::Vision => "vision model",
            PaletteSource::Histogram => "pixel histogram",
            PaletteSource::Default => "fallback palette",
        };
        eprintln!("   {}", dim(&format!("source: {source}")));
        if let Some(reasoning) = palette.reasoning() {
            eprintln!("   {}", dim(reasoning));
        }
    }
    Ok(())
}
