use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use adcase_core::{
    Config, GenerationMode, JobRequest, Naming, OutputFormat, Pipeline, Provider,
    format_case_study_readable,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::fs;
use tracing_subscriber::EnvFilter;

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", (secs / 60.0).floor(), secs % 60.0)
    }
}

/// CLI wrapper for Provider enum (needed for clap ValueEnum)
#[derive(Clone, ValueEnum)]
enum CliProvider {
    Openai,
    Grok,
    Gemini,
}

impl From<CliProvider> for Provider {
    fn from(cli: CliProvider) -> Self {
        match cli {
            CliProvider::Openai => Provider::Openai,
            CliProvider::Grok => Provider::Grok,
            CliProvider::Gemini => Provider::Gemini,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum CliFormat {
    Pdf,
    Json,
    Text,
    Html,
}

impl From<CliFormat> for OutputFormat {
    fn from(cli: CliFormat) -> Self {
        match cli {
            CliFormat::Pdf => OutputFormat::Pdf,
            CliFormat::Json => OutputFormat::Json,
            CliFormat::Text => OutputFormat::Text,
            CliFormat::Html => OutputFormat::Html,
        }
    }
}

#[derive(Parser)]
#[command(name = "adcase")]
#[command(about = "Generate an advertising case study from a YouTube commercial")]
struct Cli {
    /// Video URL
    url: String,

    /// Use this transcript instead of fetching captions
    #[arg(short, long)]
    transcript_file: Option<PathBuf>,

    /// Extra verbatim text (supers, lyrics) that script lines may quote
    #[arg(long)]
    hints_file: Option<PathBuf>,

    /// Output format. Defaults to OUTPUT_FORMAT or pdf.
    #[arg(short, long)]
    format: Option<CliFormat>,

    /// Ask the model for free-form HTML instead of structured JSON
    #[arg(long)]
    html_mode: bool,

    /// Sample video frames and OCR on-screen text (needs yt-dlp, ffmpeg, tesseract)
    #[arg(long)]
    frames: bool,

    /// Directory for generated files. Defaults to OUT_DIR or the cache dir.
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// AI provider. Defaults to LLM_PROVIDER or openai.
    #[arg(short, long)]
    provider: Option<CliProvider>,

    #[arg(long, default_value = "")]
    agency: String,
    #[arg(long, default_value = "")]
    product: String,
    #[arg(long, default_value = "")]
    campaign: String,
    #[arg(long, default_value = "")]
    commercial: String,
    #[arg(long, default_value = "")]
    director: String,
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn load_config(cli: &Cli) -> adcase_core::Result<Config> {
    let provider = cli.provider.clone().map(Provider::from);
    let mut config = Config::from_lookup(|key| match (key, provider.as_ref()) {
        ("LLM_PROVIDER", Some(p)) => Some(p.name().to_string()),
        _ => std::env::var(key).ok(),
    })?;
    if let Some(dir) = &cli.out_dir {
        config.out_dir = dir.clone();
    }
    if cli.frames {
        config.frame_sampling = true;
    }
    Ok(config)
}

async fn read_optional(path: Option<&PathBuf>) -> Result<Option<String>> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            Ok(Some(text))
        }
        None => Ok(None),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Validate API key early
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            std::process::exit(1);
        }
    };

    println!(
        "\n{}  {}\n",
        style("adcase").cyan().bold(),
        style("Ad Case Study Generator").dim()
    );
    println!(
        "{} Provider: {} {}",
        style("✓").green().bold(),
        config.provider.name(),
        style(format!("({})", config.model)).dim()
    );
    println!("{}", style("─".repeat(60)).dim());

    let request = JobRequest {
        url: cli.url.clone(),
        transcript: read_optional(cli.transcript_file.as_ref()).await?,
        hints: read_optional(cli.hints_file.as_ref()).await?,
        naming: Naming {
            agency: cli.agency.clone(),
            product: cli.product.clone(),
            campaign: cli.campaign.clone(),
            commercial: cli.commercial.clone(),
            director: cli.director.clone(),
        },
        format: cli.format.clone().map(OutputFormat::from),
        mode: if cli.html_mode {
            GenerationMode::Html
        } else {
            GenerationMode::Json
        },
    };

    let out_dir = config.out_dir.clone();
    let pipeline = Pipeline::from_config(config)?;

    let total_start = Instant::now();
    let spinner = create_spinner("Fetching, drafting and validating...");
    let output = match pipeline.run(&request).await {
        Ok(output) => output,
        Err(e) => {
            spinner.finish_and_clear();
            if let Err(log_err) =
                adcase_core::append_error_log(&out_dir, &request.url, &e.to_string()).await
            {
                tracing::warn!(error = %log_err, "Could not write error log");
            }
            eprintln!("{} {}", style("Error:").red().bold(), e);
            std::process::exit(1);
        }
    };

    let status = if output.degraded {
        style("degraded to transcript-only").yellow().to_string()
    } else {
        style("validated").green().to_string()
    };
    spinner.finish_with_message(format!(
        "{} Case study {} ({} repair passes) {}",
        style("✓").green().bold(),
        status,
        output.repair_passes,
        style(format!("[{}]", format_duration(total_start.elapsed()))).dim()
    ));

    println!("{}", style("─".repeat(60)).dim());
    for file in &output.files {
        println!(
            "{} {}",
            style("Saved:").dim(),
            style(out_dir.join(file).display()).cyan()
        );
    }
    println!("{}", style("─".repeat(60)).dim());

    // Human-readable output
    println!("{}", format_case_study_readable(&output.study));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_switch_to_minutes() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
    }

    #[test]
    fn naming_flags_default_to_empty() {
        let cli = Cli::try_parse_from(["adcase", "https://youtu.be/abc123", "--agency", "Droga5"])
            .unwrap();
        assert_eq!(cli.agency, "Droga5");
        assert!(cli.director.is_empty());
        assert!(!cli.html_mode);
        assert!(cli.format.is_none());
    }

    #[test]
    fn format_flag_maps_to_output_format() {
        let cli = Cli::try_parse_from(["adcase", "x", "--format", "text", "--html-mode"]).unwrap();
        assert_eq!(cli.format.map(OutputFormat::from), Some(OutputFormat::Text));
        assert!(cli.html_mode);
    }
}
