#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

extern crate self as common;

pub mod error;
pub mod storage;
pub mod utils;
