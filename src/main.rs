use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    sentinel_cli::cli::run().await
}
