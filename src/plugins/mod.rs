pub mod server;

use std::sync::Arc;

use crate::{prelude::*, state::AppState};

/// Long-running component started once the shared state is ready.
#[async_trait::async_trait]
pub trait Plugin: Send + Sync {
  fn name(&self) -> &'static str {
    std::any::type_name::<Self>()
  }

  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct App {
  plugins: Vec<Box<dyn Plugin>>,
}

impl App {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register<P: Plugin + 'static>(mut self, plugin: P) -> Self {
    self.plugins.push(Box::new(plugin));
    self
  }

  /// Starts every plugin in registration order. Returns how many started.
  pub async fn run(self, app: Arc<AppState>) -> usize {
    let mut started = 0;
    for plugin in self.plugins {
      let name = plugin.name();
      info!("init `{}`", name);

      match plugin.start(app.clone()).await {
        Ok(()) => started += 1,
        Err(err) => error!("failed `{}`: {err:#}", name),
      }
    }
    started
  }
}
