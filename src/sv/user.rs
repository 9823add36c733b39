use sea_orm::sea_query::Expr;

use crate::{
  entity::{referral_code, user},
  prelude::*,
  utils,
};

pub const DEFAULT_NICKNAME: &str = "微信用户";

pub struct User<'a> {
  db: &'a DatabaseConnection,
}

/// Profile fields refreshed on login. `None` leaves the stored value.
#[derive(Debug, Default, Clone)]
pub struct Profile {
  pub nickname: Option<String>,
  pub avatar_url: Option<String>,
  pub device_type: Option<String>,
}

impl<'a> User<'a> {
  pub fn new(db: &'a DatabaseConnection) -> Self {
    Self { db }
  }

  pub async fn by_id(&self, id: i32) -> Result<Option<user::Model>> {
    Ok(user::Entity::find_by_id(id).one(self.db).await?)
  }

  pub async fn by_openid(&self, openid: &str) -> Result<Option<user::Model>> {
    Ok(
      user::Entity::find()
        .filter(user::Column::Openid.eq(openid))
        .one(self.db)
        .await?,
    )
  }

  pub async fn by_phone(&self, phone: &str) -> Result<Option<user::Model>> {
    Ok(
      user::Entity::find()
        .filter(user::Column::Phone.eq(phone))
        .one(self.db)
        .await?,
    )
  }

  /// Finds or creates the user for a WeChat openid, refreshes its profile and
  /// binds `referrer_code` if the user has none yet.
  pub async fn login_openid(
    &self,
    openid: &str,
    profile: Profile,
    referrer_code: Option<&str>,
  ) -> Result<user::Model> {
    if openid.trim().is_empty() {
      return Err(Error::InvalidArgs("Missing openid".into()));
    }

    let user = match self.by_openid(openid).await? {
      Some(user) => self.refresh_profile(user, profile).await?,
      None => {
        info!("Creating new user: {}", openid);
        user::ActiveModel {
          id: NotSet,
          openid: Set(Some(openid.to_string())),
          phone: Set(None),
          nickname: Set(Some(
            profile.nickname.unwrap_or_else(|| DEFAULT_NICKNAME.into()),
          )),
          avatar_url: Set(profile.avatar_url),
          is_vip: Set(false),
          vip_expire_at: Set(None),
          referrer_code: Set(None),
          device_type: Set(profile.device_type),
          created_at: Set(utils::now()),
        }
        .insert(self.db)
        .await?
      }
    };

    self.bind_referrer(user, referrer_code).await
  }

  /// Finds or creates the user for a verified phone number.
  pub async fn login_phone(
    &self,
    phone: &str,
    device_type: Option<String>,
    referrer_code: Option<&str>,
  ) -> Result<user::Model> {
    let user = match self.by_phone(phone).await? {
      Some(user) => user,
      None => {
        info!("Creating new phone user: {}", phone);
        user::ActiveModel {
          id: NotSet,
          openid: Set(None),
          phone: Set(Some(phone.to_string())),
          nickname: Set(None),
          avatar_url: Set(None),
          is_vip: Set(false),
          vip_expire_at: Set(None),
          referrer_code: Set(None),
          device_type: Set(device_type),
          created_at: Set(utils::now()),
        }
        .insert(self.db)
        .await?
      }
    };

    self.bind_referrer(user, referrer_code).await
  }

  async fn refresh_profile(
    &self,
    user: user::Model,
    profile: Profile,
  ) -> Result<user::Model> {
    if profile.nickname.is_none()
      && profile.avatar_url.is_none()
      && profile.device_type.is_none()
    {
      return Ok(user);
    }

    let mut active: user::ActiveModel = user.into();
    if let Some(nickname) = profile.nickname {
      active.nickname = Set(Some(nickname));
    }
    if let Some(avatar_url) = profile.avatar_url {
      active.avatar_url = Set(Some(avatar_url));
    }
    if let Some(device_type) = profile.device_type {
      active.device_type = Set(Some(device_type));
    }
    Ok(active.update(self.db).await?)
  }

  /// Write-once: the first valid code sticks, later ones are ignored.
  /// Unknown, inactive or self-owned codes are ignored as well.
  pub async fn bind_referrer(
    &self,
    user: user::Model,
    referrer_code: Option<&str>,
  ) -> Result<user::Model> {
    let Some(code) = utils::non_empty(referrer_code) else {
      return Ok(user);
    };
    if user.referrer_code.is_some() {
      return Ok(user);
    }

    let Some(referral) = referral_code::Entity::find_by_id(code.clone())
      .one(self.db)
      .await?
      .filter(|r| r.is_active)
    else {
      warn!("Ignoring unknown referrer code {} for user {}", code, user.id);
      return Ok(user);
    };

    // Cannot refer yourself
    if referral.owner_openid.is_some() && referral.owner_openid == user.openid {
      return Ok(user);
    }

    // the IS NULL filter keeps the write-once rule under concurrent logins
    let result = user::Entity::update_many()
      .col_expr(user::Column::ReferrerCode, Expr::value(code.clone()))
      .filter(user::Column::Id.eq(user.id))
      .filter(user::Column::ReferrerCode.is_null())
      .exec(self.db)
      .await?;

    if result.rows_affected > 0 {
      info!("User {} acquired via referral code {}", user.id, code);
    }

    self.by_id(user.id).await?.ok_or(Error::UserNotFound)
  }

  /// Grants perpetual VIP. Idempotent: the target state is fixed.
  /// Returns whether a user with this openid exists.
  pub async fn grant_vip(&self, openid: &str) -> Result<bool> {
    Self::grant_vip_on(self.db, openid).await
  }

  pub async fn grant_vip_on<C: ConnectionTrait>(
    conn: &C,
    openid: &str,
  ) -> Result<bool> {
    let result = user::Entity::update_many()
      .col_expr(user::Column::IsVip, Expr::value(true))
      .col_expr(user::Column::VipExpireAt, Expr::value(utils::vip_forever()))
      .filter(user::Column::Openid.eq(openid))
      .exec(conn)
      .await?;
    Ok(result.rows_affected > 0)
  }

  /// Attaches a WeChat openid to an existing (phone) user.
  pub async fn bind_openid(
    &self,
    user_id: i32,
    openid: &str,
  ) -> Result<user::Model> {
    if openid.trim().is_empty() {
      return Err(Error::InvalidArgs("Missing openid".into()));
    }

    let user = self.by_id(user_id).await?.ok_or(Error::UserNotFound)?;
    if user.openid.as_deref() == Some(openid) {
      return Ok(user);
    }
    if self.by_openid(openid).await?.is_some() {
      return Err(Error::AlreadyBound);
    }

    Ok(
      user::ActiveModel { openid: Set(Some(openid.to_string())), ..user.into() }
        .update(self.db)
        .await?,
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sv::test_utils::test_db;

  async fn seed_code(db: &DatabaseConnection, code: &str, owner: Option<&str>) {
    referral_code::ActiveModel {
      code: Set(code.into()),
      owner_name: Set("owner".into()),
      owner_contact: Set(None),
      owner_openid: Set(owner.map(Into::into)),
      commission_rate: Set(0),
      receiver_openid: Set(None),
      sharing_percentage: Set(None),
      is_active: Set(true),
      created_at: Set(utils::now()),
    }
    .insert(db)
    .await
    .unwrap();
  }

  #[tokio::test]
  async fn test_login_creates_user_once() {
    let db = test_db::setup().await;
    let sv = User::new(&db);

    let first = sv.login_openid("o-1", Profile::default(), None).await.unwrap();
    let second = sv.login_openid("o-1", Profile::default(), None).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.nickname.as_deref(), Some(DEFAULT_NICKNAME));
    assert!(!first.is_vip);
  }

  #[tokio::test]
  async fn test_login_refreshes_profile() {
    let db = test_db::setup().await;
    let sv = User::new(&db);

    sv.login_openid("o-1", Profile::default(), None).await.unwrap();
    let profile = Profile {
      nickname: Some("Alice".into()),
      avatar_url: Some("https://img/a.png".into()),
      device_type: None,
    };
    let user = sv.login_openid("o-1", profile, None).await.unwrap();

    assert_eq!(user.nickname.as_deref(), Some("Alice"));
    assert_eq!(user.avatar_url.as_deref(), Some("https://img/a.png"));
  }

  #[tokio::test]
  async fn test_referrer_code_is_write_once() {
    let db = test_db::setup().await;
    seed_code(&db, "ABC123", None).await;
    seed_code(&db, "XYZ999", None).await;
    let sv = User::new(&db);

    let user =
      sv.login_openid("o-1", Profile::default(), Some("ABC123")).await.unwrap();
    assert_eq!(user.referrer_code.as_deref(), Some("ABC123"));

    let user =
      sv.login_openid("o-1", Profile::default(), Some("XYZ999")).await.unwrap();
    assert_eq!(user.referrer_code.as_deref(), Some("ABC123"));
  }

  #[tokio::test]
  async fn test_unknown_referrer_code_is_ignored() {
    let db = test_db::setup().await;
    let sv = User::new(&db);

    let user =
      sv.login_openid("o-1", Profile::default(), Some("NOPE42")).await.unwrap();
    assert_eq!(user.referrer_code, None);
  }

  #[tokio::test]
  async fn test_cannot_refer_yourself() {
    let db = test_db::setup().await;
    seed_code(&db, "SELF22", Some("o-1")).await;
    let sv = User::new(&db);

    let user =
      sv.login_openid("o-1", Profile::default(), Some("SELF22")).await.unwrap();
    assert_eq!(user.referrer_code, None);
  }

  #[tokio::test]
  async fn test_grant_vip_is_idempotent() {
    let db = test_db::setup().await;
    let sv = User::new(&db);
    sv.login_openid("o-1", Profile::default(), None).await.unwrap();

    assert!(sv.grant_vip("o-1").await.unwrap());
    let first = sv.by_openid("o-1").await.unwrap().unwrap();
    assert!(sv.grant_vip("o-1").await.unwrap());
    let second = sv.by_openid("o-1").await.unwrap().unwrap();

    assert!(first.is_vip && second.is_vip);
    assert_eq!(first.vip_expire_at, Some(utils::vip_forever()));
    assert_eq!(first.vip_expire_at, second.vip_expire_at);
  }

  #[tokio::test]
  async fn test_grant_vip_unknown_user() {
    let db = test_db::setup().await;
    assert!(!User::new(&db).grant_vip("ghost").await.unwrap());
  }

  #[tokio::test]
  async fn test_bind_openid_conflict() {
    let db = test_db::setup().await;
    let sv = User::new(&db);
    sv.login_openid("o-1", Profile::default(), None).await.unwrap();
    let phone_user = sv.login_phone("13800138000", None, None).await.unwrap();

    assert!(matches!(
      sv.bind_openid(phone_user.id, "o-1").await,
      Err(Error::AlreadyBound)
    ));

    let bound = sv.bind_openid(phone_user.id, "o-2").await.unwrap();
    assert_eq!(bound.openid.as_deref(), Some("o-2"));
    assert_eq!(bound.phone.as_deref(), Some("13800138000"));
  }
}
