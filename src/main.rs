use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    toolsieve_cli::run().await
}
