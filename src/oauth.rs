//! WeChat website-application OAuth (QR login).

use reqwest::Client;
use serde::Deserialize;

use crate::{config::OAuthConfig, prelude::*, sv::user::Profile};

pub const ACCESS_TOKEN_URL: &str =
  "https://api.weixin.qq.com/sns/oauth2/access_token";
pub const USER_INFO_URL: &str = "https://api.weixin.qq.com/sns/userinfo";

#[derive(Debug, Deserialize)]
struct AccessToken {
  #[serde(default)]
  access_token: Option<String>,
  #[serde(default)]
  openid: Option<String>,
  #[serde(default)]
  errcode: Option<i64>,
  #[serde(default)]
  errmsg: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UserInfo {
  #[serde(default)]
  nickname: Option<String>,
  #[serde(default)]
  headimgurl: Option<String>,
  #[serde(default)]
  errcode: Option<i64>,
}

/// Identity obtained from a successful code exchange.
#[derive(Debug, Clone)]
pub struct WechatIdentity {
  pub openid: String,
  pub profile: Profile,
}

pub struct WechatOAuth {
  client: Client,
  config: OAuthConfig,
}

impl WechatOAuth {
  pub fn new(config: OAuthConfig) -> Result<Self> {
    let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
    Ok(Self { client, config })
  }

  /// Exchanges the authorization code, then fetches the profile. A failing
  /// profile lookup is tolerated.
  pub async fn exchange(&self, code: &str) -> Result<WechatIdentity> {
    let token: AccessToken = self
      .client
      .get(ACCESS_TOKEN_URL)
      .query(&[
        ("appid", self.config.app_id.as_str()),
        ("secret", self.config.app_secret.as_str()),
        ("code", code),
        ("grant_type", "authorization_code"),
      ])
      .send()
      .await?
      .json()
      .await?;

    if let Some(errcode) = token.errcode.filter(|c| *c != 0) {
      return Err(Error::OAuth(format!(
        "{errcode}: {}",
        token.errmsg.unwrap_or_default()
      )));
    }
    let (Some(access_token), Some(openid)) = (token.access_token, token.openid)
    else {
      return Err(Error::OAuth("token response without openid".into()));
    };

    info!("Authenticated openid {}", openid);

    let info = match self.user_info(&access_token, &openid).await {
      Ok(info) if info.errcode.is_none_or(|c| c == 0) => info,
      Ok(info) => {
        warn!("userinfo rejected for {}: {:?}", openid, info.errcode);
        UserInfo::default()
      }
      Err(err) => {
        warn!("Failed to fetch userinfo for {}: {}", openid, err);
        UserInfo::default()
      }
    };

    Ok(WechatIdentity {
      openid,
      profile: Profile {
        nickname: info.nickname.filter(|n| !n.is_empty()),
        avatar_url: info.headimgurl.filter(|a| !a.is_empty()),
        device_type: None,
      },
    })
  }

  async fn user_info(&self, access_token: &str, openid: &str) -> Result<UserInfo> {
    Ok(
      self
        .client
        .get(USER_INFO_URL)
        .query(&[
          ("access_token", access_token),
          ("openid", openid),
          ("lang", "zh_CN"),
        ])
        .send()
        .await?
        .json()
        .await?,
    )
  }
}
