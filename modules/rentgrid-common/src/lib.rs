pub mod capability;
pub mod config;
pub mod error;
pub mod geo;
pub mod types;

pub use config::Config;
pub use error::RentGridError;
pub use geo::{haversine_m, is_full_postcode, normalize_postcode, outcode_of, safe_id};
pub use types::*;
