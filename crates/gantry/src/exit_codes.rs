//! Exit codes for the CLI

/// Success
pub const SUCCESS: i32 = 0;

/// Invalid command-line usage
pub const USAGE_ERROR: i32 = 2;
