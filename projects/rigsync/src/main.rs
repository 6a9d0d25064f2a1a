use anyhow::Result;
use rigsync::cli::Args;

fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args = Args::parse_args();

    rigsync::commands::run(args)?;

    Ok(())
}
