//! Error types for routesyncd
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SI-11: Error Handling - Structured error types with contextual information
//! - AU-3: Content of Audit Records - Errors include sufficient detail for audit

use thiserror::Error;

/// Errors that can occur in routesyncd
///
/// # NIST Controls
/// - SI-11(a): Generate error messages providing information necessary for corrective actions
#[derive(Debug, Error)]
pub enum RoutesyncError {
    /// Redis connection or operation failed
    /// NIST: SC-8 (Transmission Confidentiality) - Database communication errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Route table store rejected an operation
    #[error("Store error: {0}")]
    Store(String),

    /// Netlink socket error
    /// NIST: SC-7 (Boundary Protection) - Kernel interface errors
    #[error("Netlink error: {0}")]
    Netlink(String),

    /// Interface lookup failed
    /// NIST: CM-8 (System Component Inventory) - Interface tracking
    #[error("Interface not found: index {0}")]
    InterfaceNotFound(u32),

    /// Malformed IP prefix
    /// NIST: SI-10 (Information Input Validation)
    #[error("Invalid IP prefix: {0}")]
    InvalidPrefix(String),

    /// Nexthop set could not be built for a route
    #[error("Unable to get nexthops (interface index {ifindex}): {reason}")]
    Extraction { ifindex: u32, reason: String },

    /// Synchronizer lifecycle misuse (e.g. starting twice)
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// Configuration error
    /// NIST: CM-6 (Configuration Settings) - Configuration validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    /// NIST: SI-11 (Error Handling) - System-level errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for routesyncd operations
pub type Result<T> = std::result::Result<T, RoutesyncError>;
