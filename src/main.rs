use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings_path = std::env::args().nth(1).map(PathBuf::from);
    medtrack_lib::run(settings_path.as_deref()).await
}
