//! Exit codes for the workspace binaries.
//!
//! These follow common Unix conventions and provide meaningful
//! status information for scripting and automation.

/// Successful execution
pub const SUCCESS: u8 = 0;

/// General/unspecified error
pub const GENERAL_ERROR: u8 = 1;

/// Command-line usage error (bad arguments)
pub const USAGE_ERROR: u8 = 2;

/// Mount or unmount operation failed
pub const MOUNT_FAILED: u8 = 6;

/// Operation cancelled or interrupted
pub const CANCELLED: u8 = 8;
