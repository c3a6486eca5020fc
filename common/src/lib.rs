pub mod error;
pub mod provider;
pub mod storage;
pub mod types;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
