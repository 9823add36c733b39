mod handlers;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use axum::{
  Router,
  routing::{get, post},
};
use tower::ServiceBuilder;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{
  cors::{Any, CorsLayer},
  trace::TraceLayer,
};

use crate::{prelude::*, state::AppState};

pub use handlers::ADMIN_TOKEN_HEADER;

/// All HTTP routes, without the per-connection layers.
pub fn routes(app: Arc<AppState>) -> Router {
  use handlers::{account, admin, pay, referral};

  Router::new()
    .route("/health", get(handlers::health))
    .route("/api/login", post(account::login))
    .route("/api/callback/wechat", get(account::wechat_callback))
    .route("/api/user/{openid}", get(account::get_user))
    .route("/api/auth/send-code", post(account::send_code))
    .route("/api/auth/login-phone", post(account::login_phone))
    .route("/api/auth/bind-wechat", post(account::bind_wechat))
    .route("/api/track/pv", post(account::track_pv))
    .route("/api/redemption/redeem", post(account::redeem))
    .route("/api/pay/create-order", post(pay::create_order))
    .route("/api/pay/notify", post(pay::notify))
    .route("/api/dev/check-pay-config", get(pay::check_pay_config))
    .route("/api/dev/force-vip", post(admin::force_vip))
    .route("/api/referral/generate", post(referral::generate))
    .route("/api/referral/stats/{code}", get(referral::stats))
    .route("/api/admin/referral", post(admin::create_referral))
    .route("/api/admin/referral/{code}/receiver", post(admin::bind_receiver))
    .route("/api/admin/referral/{code}/records", get(admin::records))
    .route("/api/admin/redemption", post(admin::issue_redemption))
    .with_state(app)
}

pub struct Plugin;

#[async_trait]
impl super::Plugin for Plugin {
  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()> {
    let governor_conf = Arc::new(
      GovernorConfigBuilder::default()
        .per_second(2)
        .burst_size(100)
        .finish()
        .context("Failed to build rate limiter config")?,
    );

    let governor_limiter = governor_conf.limiter().clone();

    tokio::spawn(async move {
      loop {
        tokio::time::sleep(Duration::from_secs(60)).await;
        governor_limiter.retain_recent();
      }
    });

    let port = app.config.port;
    let router = routes(app)
      .layer(
        ServiceBuilder::new()
          .layer(TraceLayer::new_for_http())
          .layer(GovernorLayer::new(governor_conf))
          .layer(
            CorsLayer::new()
              .allow_origin(Any)
              .allow_methods(Any)
              .allow_headers(Any),
          ),
      )
      .into_make_service_with_connect_info::<SocketAddr>();

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
      .await
      .with_context(|| format!("Failed to bind {addr}"))?;

    info!("HTTP server listening on {addr}");

    tokio::spawn(async move {
      if let Err(err) = axum::serve(listener, router).await {
        error!("HTTP server stopped: {err}");
      }
    });

    Ok(())
  }
}
