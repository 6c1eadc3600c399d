use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    faultrank_cli::main_entry().await
}
