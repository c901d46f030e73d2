use anyhow::Context;
use log::info;

use pose_bridge::pose_detection::share;
use pose_bridge::{run_server, Config, MovenetModel};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Log to stderr, override with `RUST_LOG=debug`.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load().context("loading configuration")?;
    let model = MovenetModel::new(&config.model).context("loading pose model")?;
    info!(
        "Confidence threshold: {} (exclusive)",
        config.model.confidence_threshold
    );

    run_server(config, share(model)).await?;
    Ok(())
}
