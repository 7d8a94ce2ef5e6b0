pub mod service;

pub use service::{PointSource, PriceQuery, QueryService};
