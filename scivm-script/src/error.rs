use std::fmt;

use crate::reg::{Reg, SegmentId};

/// Corrupt or inconsistent game data. Loading cannot continue past one of these.
#[derive(thiserror::Error, Debug)]
pub enum DataError {
    #[error("failed to open the class vocabulary")]
    MissingVocabulary(#[source] anyhow::Error),

    #[error("script {script} could not be fetched")]
    Resource {
        script: u16,
        #[source]
        source: anyhow::Error,
    },

    #[error("attempt to dereference class 0x{class:x}, which doesn't exist (max 0x{size:x})")]
    NoSuchClass { class: u16, size: usize },

    #[error("instantiating script {script} did not resolve class 0x{class:x}")]
    UnresolvedClass { class: u16, script: u16 },

    #[error(
        "invalid species {species}(0x{species:x}) not in interval [0,{size}) while instantiating script {script}"
    )]
    InvalidSpecies { species: u16, size: usize, script: u16 },

    #[error("script {script}: class 0x{class:x} resolves to {addr}, which holds no object")]
    MissingClassObject { class: u16, addr: Reg, script: u16 },

    #[error("circular class dependency: script {script} requested while loading (chain: {chain:?})")]
    CircularDependency { script: u16, chain: Vec<u16> },

    #[error("script {script}: malformed block at offset 0x{offset:x} (type={kind}, len={len})")]
    MalformedBlock {
        script: u16,
        offset: usize,
        kind: u16,
        len: usize,
    },

    #[error("script {script}: {what} at 0x{offset:x} (+{need}) runs past the buffer (len=0x{len:x})")]
    Truncated {
        script: u16,
        what: &'static str,
        offset: usize,
        need: usize,
        len: usize,
    },

    #[error("script {script}: fixed-heap dialect requires a heap resource")]
    MissingHeap {
        script: u16,
        #[source]
        source: anyhow::Error,
    },
}

/// Address resolution against a segment or offset that does not exist.
///
/// Whether this is fatal is up to the interpreter.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessFault {
    #[error("segment {segment} is not resident")]
    NoSegment { segment: SegmentId },

    #[error("address {addr} (+{len}) is out of bounds (segment size 0x{size:x})")]
    OutOfBounds { addr: Reg, len: usize, size: usize },

    #[error("no object at {addr}")]
    NoObject { addr: Reg },

    #[error("local variable {index} out of range (count={count})")]
    LocalOutOfRange { index: usize, count: usize },

    #[error("script {script} has no export {index}")]
    NoExport { script: u16, index: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum ScriptError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Access(#[from] AccessFault),
}

impl ScriptError {
    pub fn is_fatal_data(&self) -> bool {
        matches!(self, ScriptError::Data(_))
    }
}

pub type Result<T> = std::result::Result<T, ScriptError>;

/// Recoverable oddities found in shipped game data.
///
/// They are logged when raised and kept on the segment that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataWarning {
    /// A locals block declared more variables than the buffer holds.
    LocalsTruncated {
        offset: usize,
        declared: usize,
        kept: usize,
    },
    /// A class was declared with species == table size; the table was grown.
    ClassTableGrown { species: u16 },
    /// A relocation entry pointed past the end of the buffer.
    RelocationOutOfBounds { position: usize, len: usize },
}

impl fmt::Display for DataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataWarning::LocalsTruncated {
                offset,
                declared,
                kept,
            } => write!(
                f,
                "locals extend beyond end of script: offset {offset:04x}, count {declared:x}, kept {kept:x}"
            ),
            DataWarning::ClassTableGrown { species } => write!(
                f,
                "applying workaround for an off-by-one invalid species access ({species})"
            ),
            DataWarning::RelocationOutOfBounds { position, len } => {
                write!(f, "relocation entry {position:04x} out of bounds (len={len:x})")
            }
        }
    }
}
