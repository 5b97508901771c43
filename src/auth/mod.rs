pub mod handlers;
pub mod password;
pub mod token;

pub use token::{Claims, TokenError, TokenKeys};
