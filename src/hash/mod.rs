//! Hash and identity utilities.
//!
//! The FNV-1a checksum used by the file header lives in [`crate::bits`];
//! this module holds the MD5 block transform and the UUID factories built
//! on top of it.

mod md5;
mod uuid;

pub use md5::{digest, Md5, Md5Digest, MD5_DIGEST_SIZE};
pub use uuid::{Uuid, UUID_SIZE};
