/// Engine progress notifications, consumed by front ends (progress bars)
/// in parallel with the wire reporter.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    SessionStarted {
        upload_id: String,
        total_bytes: u64,
        total_parts: usize,
        resumed: bool,
        already_bytes: u64,
    },
    PartStarted {
        part: i32,
        size: u64,
        offset: u64,
    },
    /// Net-new bytes observed for a part (rewinds already discounted).
    Progress {
        part: i32,
        bytes: u64,
    },
    PartCompleted {
        part: i32,
        size: u64,
        etag: String,
    },
    PartFailed {
        part: i32,
        message: String,
    },
    SessionCompleted {
        success: bool,
    },
}
