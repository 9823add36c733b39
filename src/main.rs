mod config;
mod entity;
mod error;
mod oauth;
mod plugins;
mod prelude;
mod sms;
mod state;
mod sv;
mod utils;
mod wxpay;

use std::sync::Arc;

use tracing_subscriber::{
  EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::{config::Config, plugins::App, prelude::*, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();

  tracing_subscriber::registry()
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
      "phototree=debug,tower_http=debug,sea_orm=warn".into()
    }))
    .with(tracing_subscriber::fmt::layer())
    .init();

  info!("Starting PhotoTree backend v{}", env!("CARGO_PKG_VERSION"));

  let config = Config::from_env()?;
  let app_state = Arc::new(AppState::new(config).await?);

  let started = App::new()
    .register(plugins::server::Plugin)
    .run(app_state.clone())
    .await;
  if started == 0 {
    anyhow::bail!("no plugin started");
  }

  tokio::signal::ctrl_c().await?;
  info!("Shutting down");

  Ok(())
}
