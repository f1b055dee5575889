mod access_token_issuer;
mod token_lifecycle_service;

pub use access_token_issuer::*;
pub use token_lifecycle_service::*;
