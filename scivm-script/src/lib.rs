//! scivm-script
//!
//! Script loading and object memory for an SCI-style bytecode VM: segments,
//! the global class table, the two script resource dialects and the locker
//! based lifecycle that ties them together.
//!
//! Resources are supplied by the host through [`ResourceProvider`]; this crate
//! never touches archives or the file system.

pub mod class_table;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod loader;
pub mod opcode;
pub mod reg;
pub mod resource;
pub mod segment;

/// Local developer utilities (kept as a module, not a binary).
pub mod test;

pub use class_table::{ClassEntry, ClassTable};
pub use config::{Dialect, VmConfig, VmConfigBuilder};
pub use error::{AccessFault, DataError, DataWarning, Result, ScriptError};
pub use lifecycle::ScriptManager;
pub use opcode::{decode, DecodeError, Instruction, OpcodeFormats};
pub use reg::{Reg, SegmentId};
pub use resource::{MemoryResources, ResourceProvider};
pub use segment::{LocalVariables, Object, Segment, SegmentSpace, SegmentState};
