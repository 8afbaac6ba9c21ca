/// Default HTTP listen port
pub const DEFAULT_HTTP_PORT: u16 = 5555;

/// Maximum image upload size in bytes (50 MiB)
pub const MAX_IMAGE_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Maximum video upload size in bytes (200 MiB)
pub const MAX_VIDEO_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

/// Maximum voice-message upload size in bytes (50 MiB)
pub const MAX_VOICE_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Lifetime of an uploaded blob before the sweep reclaims it
pub const TEMP_FILE_TTL_DAYS: i64 = 7;

/// Interval between sweep passes over expired uploads
pub const SWEEP_INTERVAL_SECS: u64 = 60 * 60;

/// Maximum characters of message text quoted in a notification preview
pub const PREVIEW_MAX_CHARS: usize = 50;

/// Row cap for an unfiltered message history read
pub const MESSAGE_HISTORY_LIMIT: u32 = 2000;

/// Row cap for a notification backlog read
pub const NOTIFICATION_BACKLOG_LIMIT: u32 = 50;
