use std::time::Duration;

/// Characters per estimated usage unit
pub const CHARS_PER_UNIT: u64 = 4;

/// Rates are quoted per this many usage units
pub const UNITS_PER_RATE: u64 = 1_000_000;

/// Model used when none is configured, and the pricing fallback for unknown models
pub const DEFAULT_MODEL: &str = "gemini-1.5-pro";

pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Upper bound for a single inference round trip
pub const DEFAULT_INFER_TIMEOUT: Duration = Duration::from_secs(60);

/// Number of most recent messages kept in a subscription window
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Audit entries held locally while the store is unreachable
pub const MAX_AUDIT_FALLBACK: usize = 1024;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Architect AI.";

pub const DEBUGGER_SYSTEM_PROMPT: &str = "You are a code debugger. Output JSON.";

/// Decimal places shown for costs
pub const COST_DISPLAY_SCALE: u32 = 6;
