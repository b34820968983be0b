pub mod phone;
pub mod registry;
pub mod scrub;
