mod access_token_issuer_fake;
mod jwt_access_token_issuer;
mod token_lifecycle_service_impl;

pub use access_token_issuer_fake::*;
pub use jwt_access_token_issuer::*;
pub use token_lifecycle_service_impl::*;
