use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use proxy_assess::{
    proxy::{AssessConfig, Assessment, Assessor, CandidateList, ProbeConfig, RetryPolicy},
    tui::AssessApp,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// A bulk proxy quality assessor
#[derive(Parser)]
#[command(name = "proxy-assess")]
#[command(about = "Measure latency and download throughput through HTTP proxies")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Assess proxies and save the ones meeting the throughput threshold
    Assess(AssessArgs),
    /// Only check which lines look like IPv4:port
    Validate {
        /// Input file containing proxies, or - for stdin
        input: PathBuf,
    },
}

#[derive(Args)]
struct AssessArgs {
    /// Input file containing proxies, or - for stdin
    input: PathBuf,
    /// Output file for accepted proxies
    #[arg(short, long, default_value = "successful_proxies.txt")]
    accepted: PathBuf,
    /// Minimum average download speed in MB/s
    #[arg(long, default_value = "1.0", env = "PROXY_ASSESS_THRESHOLD")]
    threshold: f64,
    /// Measurement rounds per proxy
    #[arg(short, long, default_value = "3", env = "PROXY_ASSESS_ROUNDS")]
    rounds: usize,
    /// Number of proxies assessed concurrently
    #[arg(short = 'n', long, default_value = "10", env = "PROXY_ASSESS_CONCURRENCY")]
    concurrency: usize,
    /// URL used for the liveness check
    #[arg(long, env = "PROXY_ASSESS_LIVENESS_URL")]
    liveness_url: Option<String>,
    /// URL of the payload used for the throughput check
    #[arg(long, env = "PROXY_ASSESS_DOWNLOAD_URL")]
    download_url: Option<String>,
    /// Liveness timeout in seconds
    #[arg(long, default_value = "10")]
    liveness_timeout: u64,
    /// Download timeout in seconds
    #[arg(long, default_value = "20")]
    download_timeout: u64,
    /// Retries per request on 5xx answers and connection errors
    #[arg(long, default_value = "3")]
    retries: u32,
    /// Base of the exponential retry backoff in milliseconds
    #[arg(long, default_value = "100")]
    backoff_ms: u64,
    /// Print the full report as JSON
    #[arg(long)]
    json: bool,
    /// Show a live progress view
    #[arg(long)]
    tui: bool,
}

impl AssessArgs {
    fn config(&self) -> AssessConfig {
        let mut probe = ProbeConfig::new()
            .with_liveness_timeout(Duration::from_secs(self.liveness_timeout))
            .with_download_timeout(Duration::from_secs(self.download_timeout))
            .with_retry(
                RetryPolicy::default()
                    .with_max_retries(self.retries)
                    .with_backoff_base(Duration::from_millis(self.backoff_ms)),
            );
        if let Some(url) = &self.liveness_url {
            probe = probe.with_liveness_url(url.clone());
        }
        if let Some(url) = &self.download_url {
            probe = probe.with_download_url(url.clone());
        }

        AssessConfig::new()
            .with_threshold(self.threshold)
            .with_rounds(self.rounds)
            .with_concurrency(self.concurrency)
            .with_probe(probe)
    }
}

fn init_logging(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Assess(args)) => {
            init_logging(if args.tui { "warn" } else { "proxy_assess=info" });
            assess(args).await?;
        }
        Some(Commands::Validate { input }) => {
            init_logging("proxy_assess=info");
            let candidates = CandidateList::read(&input)?;
            let (valid, invalid) = CandidateList::partition_valid(&candidates);

            for candidate in &valid {
                println!("valid    {}", candidate);
            }
            for candidate in &invalid {
                println!("invalid  {:?}", candidate);
            }
            println!("\n{} valid, {} invalid", valid.len(), invalid.len());
        }
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
        }
    }

    Ok(())
}

async fn assess(args: AssessArgs) -> Result<()> {
    let config = args.config();
    config.validate()?;

    let candidates = CandidateList::read(&args.input)?;
    info!("Loaded {} candidates from {:?}", candidates.len(), args.input);

    if args.tui {
        let app = AssessApp::new(candidates, config, Some(args.accepted.clone()));
        if let Some(assessment) = app.run().await? {
            print!("{}", render_report(&assessment, args.json)?);
        }
        return Ok(());
    }

    // Stdout carries only the report; everything else goes to stderr.
    eprintln!(
        "Assessing {} proxies with {} workers, {} rounds, threshold {} MB/s",
        candidates.len(),
        config.concurrency,
        config.rounds,
        config.threshold_mbps
    );

    let assessor = Assessor::with_config(config);
    let assessment = assessor
        .assess_with_progress(candidates, |result, progress| {
            eprintln!(
                "[{:>5.1}%] {} {}",
                progress.fraction() * 100.0,
                result.address,
                result.status_text()
            );
        })
        .await?;

    CandidateList::save_to_file(&assessment.accepted, &args.accepted)?;
    print!("{}", render_report(&assessment, args.json)?);
    eprintln!(
        "Saved {} accepted proxies to {:?}",
        assessment.accepted.len(),
        args.accepted
    );

    Ok(())
}

/// Report text for stdout: a JSON document or a table
fn render_report(assessment: &Assessment, json: bool) -> Result<String> {
    if json {
        return Ok(format!("{}\n", serde_json::to_string_pretty(assessment)?));
    }

    let mut out = format!(
        "\n{:<24} {:>14} {:>14}  {}\n",
        "Proxy", "Avg Ping (s)", "Avg MB/s", "Status"
    );
    for result in &assessment.report {
        out.push_str(&format!(
            "{:<24} {:>14} {:>14}  {}\n",
            result.address,
            format_reading(result.average_latency_secs, 3),
            format_reading(result.average_throughput_mbps, 2),
            result.status_text()
        ));
    }
    out.push_str(&format!(
        "\nResults: {} succeeded, {} accepted, {} total\n",
        assessment.success_count(),
        assessment.accepted.len(),
        assessment.report.len()
    ));
    Ok(out)
}

fn format_reading(reading: Option<f64>, precision: usize) -> String {
    reading.map_or_else(|| "inf".to_string(), |value| format!("{:.*}", precision, value))
}
