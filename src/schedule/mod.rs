pub mod error;
pub mod expander;
pub mod model;
pub mod table;
pub mod time;
