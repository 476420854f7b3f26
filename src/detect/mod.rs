pub mod images;
pub mod ingest;
pub mod parse;

pub use images::{ImageInputError, normalize_image};
pub use ingest::{IngestError, infer_item};
