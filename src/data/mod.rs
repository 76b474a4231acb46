pub mod loader;
pub mod types;

pub(crate) use loader::parse_date;
pub use loader::{business_days, load_csv, synthetic, DataConfig, DataLoader, LoaderError, SyntheticConfig};
pub use types::{Bar, BarTable, PositionSeries};
