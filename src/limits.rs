use crate::model::Ms;

pub const MAX_SERVICES: usize = 1_000_000;
pub const MAX_ASSIGNMENTS_PER_KIND: usize = 1_000;
pub const MAX_DELETE_BATCH: usize = 10_000;
pub const MAX_REVALIDATE_BATCH: usize = 10_000;
/// Longest chain the unlinker and `chain()` will walk before assuming a cycle.
pub const MAX_CHAIN_LENGTH: usize = 10_000;
pub const MAX_LOCALITY_LEN: usize = 1_024;
pub const MAX_GENERATION_ID_LEN: usize = 256;
pub const MAX_RULE_NAME_LEN: usize = 256;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2200-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;
/// One year of hours.
pub const MAX_DURATION_HOURS: i64 = 8_760;
