mod session_family_store_memory;

pub use session_family_store_memory::*;
