//! Smile design CLI tool
//!
//! Builds mouth-region masks from face landmarks and sends portraits through
//! the configured remote edit and restoration models.

#[cfg(feature = "cli")]
use smile_design::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
