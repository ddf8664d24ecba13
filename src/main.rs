use std::io::Write as _;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use log::debug;
use url::Url;

use speedprobe::errors::{classify_message, exit_codes};
use speedprobe::progress::{MeasurementState, Phase, ProgressSink};
use speedprobe::results::SpeedTestReport;
use speedprobe::{HttpTransport, TestConfig, TestEngine};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the speedprobe server
    #[arg(long, default_value = "http://localhost:3000/")]
    server: Url,

    /// Number of latency probes
    #[arg(long, default_value_t = 10)]
    rounds: usize,

    /// Wall-clock budget per transfer phase, in seconds
    #[arg(long, default_value_t = 10)]
    duration_secs: u64,

    /// Print the result as JSON instead of a summary
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity,
}

/// Renders live progress lines on stdout. Suppressed in JSON mode so the
/// output stays machine-readable.
struct ConsoleSink {
    quiet: bool,
}

impl ProgressSink for ConsoleSink {
    fn on_progress(&self, state: &MeasurementState) {
        if self.quiet {
            return;
        }

        let line = match state.phase {
            Phase::Latency => format!(
                "{} {:>3}%  {} ms",
                "Latency ".bold().white(),
                state.progress,
                state.latency_ms
            ),
            Phase::Download => format!(
                "{} {:>3}%  {:.2} Mbps",
                "Download".bold().white(),
                state.progress,
                state.download_mbps
            ),
            Phase::Upload => format!(
                "{} {:>3}%  {:.2} Mbps",
                "Upload  ".bold().white(),
                state.progress,
                state.upload_mbps
            ),
            Phase::Idle | Phase::Complete => return,
        };

        print!("\r{}\x1b[K", line);
        let _ = std::io::stdout().flush();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.verbosity.log_level_filter())
        .init();

    let config = TestConfig {
        latency_rounds: cli.rounds,
        download_duration: Duration::from_secs(cli.duration_secs),
        upload_duration: Duration::from_secs(cli.duration_secs),
        ..TestConfig::default()
    };
    debug!("measuring against {}", cli.server);

    let transport = match HttpTransport::new(cli.server) {
        Ok(transport) => transport,
        Err(error) => {
            eprintln!("{}", error);
            std::process::exit(error.exit_code());
        }
    };

    let sink = ConsoleSink { quiet: cli.json };
    let state = TestEngine::new(config).run(&transport, &sink).await;
    if !cli.json {
        println!();
    }

    let report = SpeedTestReport::from_state(&state);

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(error) => {
                eprintln!("failed to serialize report: {}", error);
                std::process::exit(exit_codes::UNKNOWN_ERROR);
            }
        }
    } else {
        print_summary(&report);
    }

    if let Some(ref message) = report.error {
        eprintln!("{} {}", "Error:".bold().red(), message);
        std::process::exit(classify_message(message).exit_code());
    }
}

fn print_summary(report: &SpeedTestReport) {
    println!("{} {} ms", "Latency:".bold().white(), report.latency_ms);
    println!("{} {} ms", "Jitter:".bold().white(), report.jitter_ms);
    println!(
        "{} {}",
        "Download speed:".bold().white(),
        format!("{:.2} Mbps", report.download_mbps).bright_cyan()
    );
    println!(
        "{} {}",
        "Upload speed:".bold().white(),
        format!("{:.2} Mbps", report.upload_mbps).bright_cyan()
    );
}
