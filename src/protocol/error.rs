use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("buffer too small: need {needed} bytes at offset {offset}, have {capacity}")]
    BufferTooSmall { needed: usize, offset: usize, capacity: usize },

    #[error("frame truncated while reading {field}: need {needed} bytes, {remaining} left")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },

    #[error("frame length mismatch: declared {declared} bytes but message spans {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("unexpected schema id {actual}, expected {expected}")]
    SchemaMismatch { expected: u16, actual: u16 },

    #[error("unexpected template id {actual}, expected {expected}")]
    TemplateMismatch { expected: u16, actual: u16 },

    #[error("unknown template id {0}")]
    UnknownTemplate(u16),

    #[error("block length {actual} is shorter than the {minimum} bytes this version requires")]
    BlockTooShort { minimum: u16, actual: u16 },

    #[error("{field} is {length} bytes, variable length fields are limited to {max}")]
    FieldTooLong {
        field: &'static str,
        length: usize,
        max: usize,
    },

    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },

    #[error("invalid value {value} for {field}")]
    InvalidEnumValue { field: &'static str, value: u8 },

    #[error("{field} can't be {value}, that value marks an absent member")]
    ReservedValue { field: &'static str, value: i64 },
}
