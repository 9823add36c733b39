pub mod auth;
pub mod notify;
pub mod order;
pub mod redemption;
pub mod referral;
pub mod settlement;
#[cfg(test)]
pub mod test_utils;
pub mod tracking;
pub mod user;

pub use auth::Auth;
pub use notify::Notify;
pub use order::Order;
pub use redemption::Redemption;
pub use referral::Referral;
pub use tracking::Tracking;
pub use user::User;
