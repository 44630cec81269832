use clap::Parser;
use tracing_subscriber::EnvFilter;

use kiwiray_driver::config::{DriverConfig, LOOP_HZ, TIMEOUT_EMOTICON};

/// KiwiRay driver bridged to Zenoh
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Serial device of the KiwiRay controller; serial stays off without it
    #[arg(short, long)]
    device: Option<String>,

    /// Ticks before a happy/angry face reverts
    #[arg(long, default_value_t = TIMEOUT_EMOTICON)]
    emoticon_timeout: u32,

    /// Voice names known to the speech host, first one is selected
    #[arg(long = "voice", default_values_t = ["default".to_string()])]
    voices: Vec<String>,

    /// Host tick rate
    #[arg(long, default_value_t = LOOP_HZ, value_parser = clap::value_parser!(u64).range(1..=1000))]
    tick_hz: u64,
}


#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();
    let config = DriverConfig {
        device: args.device,
        emoticon_timeout: args.emoticon_timeout,
    };

    if let Err(e) = kiwiray_driver::runtime::run(config, args.voices, args.tick_hz).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
