pub mod referral;
pub mod vital_sign;

pub use referral::*;
pub use vital_sign::*;
