// store

mod session_family_store;

pub use session_family_store::*;
