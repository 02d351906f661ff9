use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use url::Url;

/// Probes a service health endpoint, exits non-zero unless it reports ready
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Health endpoint to probe
    #[arg(env = "HEALTH_URL", default_value = "http://127.0.0.1:8080/health")]
    url: Url,

    /// Request timeout in seconds
    #[arg(short, long, default_value_t = 5)]
    timeout: u64,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let client = match reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(args.timeout))
        .build()
    {
        Ok(client) => client,
        Err(err) => {
            eprintln!("Failed to build HTTP client: {err}");
            return ExitCode::FAILURE;
        }
    };

    match client.get(args.url.clone()).send() {
        Ok(res) if res.status().is_success() => ExitCode::SUCCESS,
        Ok(res) => {
            eprintln!("{} responded with {}", args.url, res.status());
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("Request to {} failed: {err}", args.url);
            ExitCode::FAILURE
        }
    }
}
