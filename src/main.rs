#[tokio::main]
async fn main() -> flowsmith::Result<()> {
    flowsmith::cmd::run().await
}
