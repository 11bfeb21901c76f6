//! bgswap CLI
//!
//! Cuts the subject out of photos and recomposites it over a solid color,
//! using the ONNX Runtime or Tract backend.

#[cfg(feature = "cli")]
use bgswap::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
