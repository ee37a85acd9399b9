pub mod currency;
pub mod error;
pub mod vault;

pub use currency::Currency;
pub use error::{AppError, Result};
pub use vault::CredentialVault;
