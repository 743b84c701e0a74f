mod data_source;
mod tier;

pub use data_source::DataSource;
pub use tier::CacheTier;
