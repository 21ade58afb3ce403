mod entry;
mod error;
mod in_memory;
mod metadata;
mod stream;

pub use entry::{LoggedEvent, POSITION_NOT_SET};
pub use error::LogStreamError;
pub use in_memory::InMemoryLogStream;
pub use metadata::{RecordMetadata, RecordType, ValueType, REJECTION_TYPE_NULL};
pub use stream::{CommitListener, CommitListenerId, LogStream, LogStreamReader};
