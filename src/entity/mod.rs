pub mod page_view;
pub mod profit_sharing_record;
pub mod redemption_code;
pub mod referral_code;
pub mod sms_code;
pub mod user;

pub use profit_sharing_record::SharingStatus;
pub use redemption_code::RedemptionStatus;
