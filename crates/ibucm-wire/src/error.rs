/// Errors that can occur while building commands or decoding responses.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// A record is shorter than its fixed layout.
    #[error("truncated {record} record ({len} bytes, need {need})")]
    Truncated {
        record: &'static str,
        len: usize,
        need: usize,
    },

    /// A variable-length field does not fit its 8-bit length field.
    #[error("{field} too long ({len} bytes, max {max})")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// A buffer attached to a command could not be allocated.
    #[error("out of memory allocating {0}-byte buffer")]
    OutOfMemory(usize),
}

pub type Result<T> = std::result::Result<T, WireError>;
