#[tokio::main]
async fn main() -> anyhow::Result<()> {
    deskwatch_lib::run().await
}
