//! Storage engine for TallyDB.
//!
//! This crate provides:
//! - An arena-backed B+ tree with split/merge rebalancing and a linked leaf
//!   chain for range scans
//! - Named indexes that own one tree each

mod btree;
mod index;

pub use btree::{BPlusTree, RangeScan};
pub use index::Index;
