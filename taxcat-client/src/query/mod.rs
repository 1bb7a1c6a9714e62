//! Filtered, paginated catalog queries

pub mod controller;
pub mod scheduler;
pub mod suggestions;

pub use controller::{parse_bound, Phase, QueryController, QueryFailure, QueryState, QueryView};
pub use suggestions::{suggest_counties, NEW_YORK_COUNTIES};
