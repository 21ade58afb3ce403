mod configuration;
mod error;
mod leader_state;
mod local_state;
mod raft_log;
mod replica;

pub use configuration::Configuration;
pub use error::ReplicaError;
pub use local_state::{PersistentLocalState, Term, VolatileLocalState};
pub use replica::{RaftRole, Replica, ReplicaConfig};
