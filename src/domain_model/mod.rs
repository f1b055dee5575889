mod refresh_token;
mod session_family;
mod user;

pub use refresh_token::*;
pub use session_family::*;
pub use user::*;
