//! Quetzal save-state codec: an IFF chunk format the core can serialize to and parse from an
//! opaque byte buffer, leaving the actual storage medium to the host (see the I/O channel's
//! `save`/`restore` commands).
//!
//! Grounded on the source lineage's `quetzal/` module, whose `IffFile` read and wrote files
//! directly; here the file I/O is pulled out entirely and `IffFile` only knows `to_bytes` /
//! `from_bytes`, matching the rest of the crate's "host owns storage" boundary.

pub mod chunks;
pub mod compressed_memory;
pub mod iff;
pub mod restore;
pub mod save;

pub use restore::{restore_from_bytes, RestorePoint};
pub use save::create_save_bytes;
