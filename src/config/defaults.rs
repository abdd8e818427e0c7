//! Default constants for ringfinder configuration.
//!
//! All magic numbers are centralized here with documentation.

use crate::temporal::ONE_HOUR;

// =============================================================================
// Threshold Defaults
// =============================================================================

/// Minimum distinct buyers a partition, window or cluster needs to be flagged
pub const DEFAULT_DISTINCT_THRESHOLD: usize = 3;

/// Threshold for the shared-recipient-phone report, which tolerates households
pub const DEFAULT_SHARED_PHONE_THRESHOLD: usize = 4;

/// Threshold for the shared free-shipping-voucher report
pub const DEFAULT_VOUCHER_THRESHOLD: usize = 5;

// =============================================================================
// Temporal Defaults
// =============================================================================

/// Burst window span in seconds
pub const DEFAULT_WINDOW_SECS: i64 = ONE_HOUR;

// =============================================================================
// Fuzzy Matching Defaults
// =============================================================================

/// Similarity score (0-100) at or above which two fields count as similar
pub const DEFAULT_SIMILARITY_THRESHOLD: u8 = 85;

/// Largest order-value difference still treated as "the same amount"
pub const DEFAULT_VALUE_TOLERANCE: f64 = 300_000.0;

/// Leading name tokens in the blocking key
pub const DEFAULT_NAME_BLOCK_WORDS: usize = 7;

/// Leading address tokens in the blocking key
/// Two words usually isolate the street or hamlet without splitting typo variants.
pub const DEFAULT_ADDRESS_BLOCK_WORDS: usize = 2;

// =============================================================================
// Column Defaults
// =============================================================================

pub const DEFAULT_BUYER_ID_COLUMN: &str = "buyer_id";
pub const DEFAULT_DEVICE_PHONE_COLUMN: &str = "N3";
pub const DEFAULT_RECIPIENT_PHONE_COLUMN: &str = "recipient_phone_";
pub const DEFAULT_PROMOTION_COLUMN: &str = "pv_promotion_id";
pub const DEFAULT_VOUCHER_COLUMN: &str = "fsv_voucher_code";
pub const DEFAULT_DISTRICT_COLUMN: &str = "buyer_shipping_address_district";
pub const DEFAULT_CHECKOUT_IP_COLUMN: &str = "ip_checkout";
pub const DEFAULT_CREATE_TIME_COLUMN: &str = "create_time";
pub const DEFAULT_REGISTRATION_TIME_COLUMN: &str = "registration_time";
pub const DEFAULT_RECIPIENT_NAME_COLUMN: &str = "recipient_name";
pub const DEFAULT_ORDER_VALUE_COLUMN: &str = "order_value";

// =============================================================================
// Output Defaults
// =============================================================================

/// Header used by the exact-key and burst reports
pub const ID_HEADER: &str = "ID";

/// Header used by the fuzzy and shared-phone reports
pub const BUYER_ID_HEADER: &str = "buyer_id";
