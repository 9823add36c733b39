use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database};

use crate::{
  config::Config,
  oauth::WechatOAuth,
  prelude::*,
  sms::{self, SmsSender},
  sv,
  wxpay::{PayApi, WechatPay},
};

pub struct AppState {
  pub db: DatabaseConnection,
  pub config: Config,
  pub pay: Option<Arc<dyn PayApi>>,
  /// Why payment is unavailable, if it is.
  pub pay_error: Option<String>,
  pub oauth: Option<WechatOAuth>,
  pub sms: Arc<dyn SmsSender>,
}

pub struct Services<'a> {
  pub user: sv::User<'a>,
  pub referral: sv::Referral<'a>,
  pub redemption: sv::Redemption<'a>,
  pub tracking: sv::Tracking<'a>,
  pub auth: sv::Auth<'a>,
}

impl AppState {
  pub async fn new(config: Config) -> Result<Self> {
    let mut options = ConnectOptions::new(&config.database_url);
    options.sqlx_logging(false);
    let db = Database::connect(options).await?;
    Migrator::up(&db, None).await?;

    let (pay, pay_error) = match config.pay.clone() {
      Some(pay_config) => match WechatPay::new(pay_config) {
        Ok(pay) => (Some(Arc::new(pay) as Arc<dyn PayApi>), None),
        Err(err) => {
          error!("WeChat Pay disabled: {}", err);
          (None, Some(err.to_string()))
        }
      },
      None => {
        match &config.pay_error {
          Some(err) => error!("WeChat Pay disabled: {}", err),
          None => warn!("WeChat Pay credentials not set, payment disabled"),
        }
        (None, config.pay_error.clone())
      }
    };

    let oauth = config.oauth.clone().map(WechatOAuth::new).transpose()?;
    let sms = sms::from_config(&config.sms)?;

    Ok(Self { db, config, pay, pay_error, oauth, sms })
  }

  pub fn sv(&self) -> Services<'_> {
    Services {
      user: sv::User::new(&self.db),
      referral: sv::Referral::new(&self.db),
      redemption: sv::Redemption::new(&self.db),
      tracking: sv::Tracking::new(&self.db),
      auth: sv::Auth::new(&self.db, &self.config.server_secret),
    }
  }

  pub fn pay(&self) -> Result<&dyn PayApi> {
    self.pay.as_deref().ok_or(Error::PayDisabled)
  }

  pub fn order(&self) -> Result<sv::Order<'_>> {
    Ok(sv::Order::new(&self.db, self.pay()?))
  }

  pub fn notify(&self) -> sv::Notify<'_> {
    sv::Notify::new(
      &self.db,
      self.pay.as_deref(),
      self.config.api_v3_key.as_deref(),
    )
  }
}
