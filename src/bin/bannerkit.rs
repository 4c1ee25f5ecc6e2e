//! bannerkit command-line tool
//!
//! Runs the image proxy / BFL relay server and drives acquisition, background
//! removal and the partner catalog from the shell.

#[cfg(feature = "cli")]
use bannerkit::cli;

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
