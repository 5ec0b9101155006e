#[tokio::main]
async fn main() -> anyhow::Result<()> {
    residence_core::run().await
}
