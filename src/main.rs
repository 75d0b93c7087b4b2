#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = exam_assessment::run().await {
        eprintln!("exam-assessment fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
