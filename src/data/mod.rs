pub mod hot_store;
pub mod minute_aggregator;
pub mod resample;

pub use hot_store::{FileHotStore, HotStore, Page};
pub use minute_aggregator::{MinuteAggregator, MinuteSlot, SharedMinuteAggregator, Transition};
pub use resample::{bucket_last, resample, resample_points};
