/// All wall-clock timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identifier assigned to a job by the generation engine (ComfyUI's `prompt_id`).
pub type JobId = String;
