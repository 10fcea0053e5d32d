pub mod error;
pub mod logger;
pub mod timestamps;
pub mod validation;
