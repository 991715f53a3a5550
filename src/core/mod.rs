pub mod currency;
pub mod error;
pub mod identity;

pub use currency::Currency;
pub use error::{AppError, Result};
pub use identity::{ActorRole, RequestIdentity};
