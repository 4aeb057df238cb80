use std::io;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use http_loadtest::config::{env_flag, RunConfig};
use http_loadtest::coordinator::LoadCoordinator;
use http_loadtest::metrics::{register_metrics, start_metrics_server};
use http_loadtest::prompt::Prompter;
use http_loadtest::report::NO_RESULTS_MESSAGE;
use http_loadtest::session::ReqwestSessionFactory;

/// Prints helpful configuration documentation.
fn print_config_help() {
    eprintln!("Values are prompted for interactively unless NON_INTERACTIVE=true.");
    eprintln!("Environment variables preset the prompt defaults:");
    eprintln!("  TARGET_URL              - The URL to load test (https:// is added if no scheme)");
    eprintln!("  NUM_USERS               - Concurrent virtual users (default: 1000, must be > 0)");
    eprintln!("  TEST_DURATION           - Run duration: 60, 30s, 10m, 2h (default: 60 seconds)");
    eprintln!("  REQUESTS_PER_USER       - Requests per virtual user (default: 5, must be > 0)");
    eprintln!();
    eprintln!("Optional environment variables:");
    eprintln!("  REQUEST_TIMEOUT         - Per-request timeout (default: 30s)");
    eprintln!("  THINK_TIME_MIN_MS       - Minimum pause between requests (default: 100)");
    eprintln!("  THINK_TIME_MAX_MS       - Maximum pause between requests (default: 2000)");
    eprintln!("  SKIP_TLS_VERIFY         - Skip TLS certificate verification (default: false)");
    eprintln!("  CUSTOM_HEADERS          - Comma-separated Name:Value headers (use \\, for literal commas)");
    eprintln!("  NON_INTERACTIVE         - Skip prompts and the confirmation (default: false)");
    eprintln!("  REPORT_JSON_PATH        - Also write the final report as JSON to this file");
    eprintln!("  METRICS_PORT            - Serve Prometheus metrics on this port during the run");
    eprintln!("  METRIC_NAMESPACE        - Prometheus metric namespace (default: http_loadtest)");
    eprintln!("  LOG_FORMAT              - 'json' for JSON logs (default: text)");
    eprintln!("  RUST_LOG                - Log filter (default: info)");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);

    if std::env::var("LOG_FORMAT").map_or(false, |f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn config_error(e: impl std::fmt::Display) -> ! {
    eprintln!("Configuration error: {}\n", e);
    print_config_help();
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    println!("HTTP Load Testing Tool");
    println!("{}", "=".repeat(30));

    let config = RunConfig::from_env().unwrap_or_else(|e| config_error(e));
    let interactive = !env_flag("NON_INTERACTIVE");

    let stdin = io::stdin();
    let mut prompter = Prompter::new(stdin.lock(), io::stdout());

    let config = if interactive {
        prompter
            .collect_config(config)
            .unwrap_or_else(|e| config_error(e))
    } else {
        config
    };
    if let Err(e) = config.validate() {
        config_error(e);
    }

    let sessions = ReqwestSessionFactory::from_config(&config).unwrap_or_else(|e| config_error(e));

    if interactive && !prompter.confirm(&config.target_url)? {
        println!("Load test cancelled.");
        return Ok(());
    }
    drop(prompter);

    config.print_summary();

    register_metrics();
    if let Some(port) = config.metrics_port {
        tokio::spawn(start_metrics_server(port));
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping virtual users");
                cancel.cancel();
            }
        });
    }

    let report_json_path = config.report_json_path.clone();
    let coordinator = LoadCoordinator::new(config, Arc::new(sessions));
    let outcome = coordinator.run(cancel).await?;

    match outcome.report() {
        Some(report) => {
            println!("\n{}", report);
            if let Some(path) = report_json_path {
                match report.write_json(&path) {
                    Ok(()) => info!(path = %path, "Report written"),
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
        }
        None => println!("{}", NO_RESULTS_MESSAGE),
    }

    if outcome.interrupted {
        println!("\nLoad test interrupted by user.");
    }

    Ok(())
}
