#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = examhall::run_worker().await {
        eprintln!("examhall-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
