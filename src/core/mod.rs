pub mod error;
pub mod evidence;
pub mod hash;
pub mod time;
