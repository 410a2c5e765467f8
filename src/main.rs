#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = clipwatch::Args::parse(std::env::args().skip(1))?;
    clipwatch::run(args).await
}
