use crate::{entity::page_view, prelude::*, utils};

pub struct Tracking<'a> {
  db: &'a DatabaseConnection,
}

#[derive(Debug, Default, Clone)]
pub struct PageView {
  pub session_id: String,
  pub referrer_code: Option<String>,
  pub device_type: Option<String>,
  pub user_agent: Option<String>,
}

impl<'a> Tracking<'a> {
  pub fn new(db: &'a DatabaseConnection) -> Self {
    Self { db }
  }

  pub async fn page_view(&self, pv: PageView) -> Result<()> {
    if pv.session_id.trim().is_empty() {
      return Err(Error::InvalidArgs("Missing sessionId".into()));
    }

    page_view::ActiveModel {
      id: NotSet,
      session_id: Set(pv.session_id),
      referrer_code: Set(utils::non_empty(pv.referrer_code.as_deref())),
      device_type: Set(pv.device_type),
      user_agent: Set(pv.user_agent),
      created_at: Set(utils::now()),
    }
    .insert(self.db)
    .await?;

    Ok(())
  }
}
