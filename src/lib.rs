pub mod catalog;
pub mod compactor;
pub mod directory;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod rules;
pub mod wal;
