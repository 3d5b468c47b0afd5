//! Constants used throughout the Concord library.

/// Maximum number of times a submission re-runs detection after losing an
/// optimistic commit race. Exhausting the budget surfaces the edit as
/// awaiting manual resolution instead of looping.
pub const MAX_COMMIT_RETRIES: u32 = 3;

/// Author identity recorded on edits synthesized by the engine itself
/// (merged payloads produced by the auto-merge strategy).
pub const SYSTEM_AUTHOR: &str = "system";

/// Element class label that policy books may use to force manual review
/// of protected document sections.
pub const PROTECTED_CLASS: &str = "protected";
