//! Turning raw per-scrape samples into derived, chart-ready series.

pub mod align;
pub mod calc;

pub use align::{align, composite_key, transform, TimeUnit};
pub use calc::{Calc, FieldRef};
