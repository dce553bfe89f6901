//! In-memory key-value store for snapshot data.
//!
//! Apart from basic data storage the store supports atomic batch writes and
//! iterating over the key space in binary-alphabetical order, which makes it
//! a drop-in stand-in for the persistent backends in tests.

mod memorydb;
pub use memorydb::{MemoryDB, MemoryDBBatch, MemoryDBError, MemoryDBIterator};
