pub mod claims;
pub mod extractors;
pub mod gate;
pub mod jwt;
pub mod password;
