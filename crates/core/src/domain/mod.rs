pub mod catalog;
pub mod flat;
pub mod locale;
pub mod related;
pub mod sync;
