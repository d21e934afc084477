pub mod auth;
pub mod error;
pub mod identity;
pub mod mutations;
pub mod ports;
pub mod responses;
pub mod scope;
pub mod surveys;
pub mod users;
pub mod util;

pub type DomainResult<T> = Result<T, error::DomainError>;
