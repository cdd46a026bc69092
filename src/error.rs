//! Error types for DAC streaming sessions

/// Error types for DAC streaming operations
#[derive(thiserror::Error, Debug)]
pub enum DacError {
    /// Timer or DAC channel already owned by another active session
    #[error("Resource conflict: {0} is already in use by an active session")]
    ResourceConflict(Resource),

    /// DAC or timer hardware rejected the requested configuration
    #[error("{what} initialisation failed ({code})")]
    Initialization {
        /// Which piece of hardware failed
        what: &'static str,
        /// Platform-specific error code
        code: i32,
    },

    /// Sound container header failed validation
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// Ring buffer storage could not be obtained
    #[error("Failed to allocate {bytes} byte buffer")]
    Allocation {
        /// Requested size in bytes
        bytes: usize,
    },

    /// Caller passed a value outside the accepted range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// IO error from the filesystem
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<String> for DacError {
    /// Converts a String into `DacError::InvalidArgument`.
    ///
    /// Argument checks build their message with `format!` and return it through `?`,
    /// so this is the variant they land in.
    fn from(msg: String) -> Self {
        DacError::InvalidArgument(msg)
    }
}

impl From<&str> for DacError {
    fn from(msg: &str) -> Self {
        DacError::InvalidArgument(msg.to_string())
    }
}

/// Hardware resource named in a [`DacError::ResourceConflict`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// A hardware timer
    Timer(u32),
    /// A DAC output channel
    DacChannel(u32),
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::Timer(id) => write!(f, "timer {id}"),
            Resource::DacChannel(id) => write!(f, "DAC channel {id}"),
        }
    }
}

/// Structural or content problem in a RIFF/WAVE header
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The file ended inside the header
    #[error("header truncated while reading {0}")]
    Truncated(&'static str),

    /// A chunk or form tag did not match
    #[error("expected '{expected}' tag, found {found:?}")]
    MissingTag {
        /// Tag the parser required at this position
        expected: &'static str,
        /// The four bytes actually present
        found: [u8; 4],
    },

    /// Compression code other than uncompressed PCM
    #[error("unsupported compression code {0} (only PCM is supported)")]
    UnsupportedCompression(u16),

    /// Derived bytes-per-sample is not 1 or 2
    #[error("unsupported bit depth (block align {block_align}, {channels} channels)")]
    UnsupportedBitDepth {
        /// Block alignment from the format chunk
        block_align: u16,
        /// Channel count from the format chunk
        channels: u16,
    },

    /// Format chunk declares zero channels
    #[error("format chunk declares zero channels")]
    InvalidChannelCount,

    /// Format chunk shorter than the 16 bytes every PCM header carries
    #[error("format chunk too short ({0} bytes)")]
    ShortFormatChunk(u32),
}

/// Result type for DAC streaming operations
pub type Result<T> = std::result::Result<T, DacError>;
