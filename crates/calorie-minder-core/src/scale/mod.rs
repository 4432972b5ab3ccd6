//! Network bathroom-scale ingestion.

pub mod ingestor;
pub mod payload;

pub use ingestor::{bind_scale_socket, ScaleIngestor};
pub use payload::parse_weight;
