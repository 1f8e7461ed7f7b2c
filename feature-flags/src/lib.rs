pub mod cache;
pub mod config;
pub mod errors;
pub mod flags;
pub mod ui;

// Kept public (not cfg(test)) so the integration tests under tests/ can use the mocks.
pub mod test_utils;
