//! Raw tick archive: Parquet codec, object stores, batcher and read-back

pub mod batcher;
pub mod codec;
pub mod reader;
pub mod store;

pub use batcher::{day_prefix, partition_key, ArchiveBatcher};
pub use codec::{decode_ticks, encode_ticks};
pub use reader::ArchiveReader;
pub use store::{FsObjectStore, MemoryObjectStore, ObjectStore};
