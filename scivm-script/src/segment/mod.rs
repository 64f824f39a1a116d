//! Segment memory: one segment per resident script.

mod object;

pub use object::{Method, Object, ObjectLayout, INFO_CLASS, NO_CLASS, OBJECT_MAGIC};

use std::collections::{BTreeMap, HashMap};

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;

use crate::config::Dialect;
use crate::error::{AccessFault, DataWarning};
use crate::reg::{Reg, SegmentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// The loader is still populating the segment.
    Loading,
    Resident,
    /// Lockers reached zero; the segment behaves as absent.
    Deleted,
}

/// Per-script local variables. The count is fixed at load time.
#[derive(Debug, Clone, Default)]
pub struct LocalVariables {
    values: Vec<Reg>,
    /// Buffer offset of the first local, when the locals are backed by script data.
    offset: Option<u32>,
}

impl LocalVariables {
    pub(crate) fn zeroed(count: usize) -> Self {
        Self {
            values: vec![Reg::NULL; count],
            offset: None,
        }
    }

    pub(crate) fn from_words(offset: u32, words: &[u8]) -> Self {
        let values = words
            .chunks_exact(2)
            .map(|w| Reg::number(LittleEndian::read_u16(w)))
            .collect();
        Self {
            values,
            offset: Some(offset),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn offset(&self) -> Option<u32> {
        self.offset
    }

    pub fn as_slice(&self) -> &[Reg] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Result<Reg, AccessFault> {
        self.values
            .get(index)
            .copied()
            .ok_or(AccessFault::LocalOutOfRange {
                index,
                count: self.values.len(),
            })
    }

    pub fn set(&mut self, index: usize, value: Reg) -> Result<(), AccessFault> {
        let count = self.values.len();
        let slot = self
            .values
            .get_mut(index)
            .ok_or(AccessFault::LocalOutOfRange { index, count })?;
        *slot = value;
        Ok(())
    }

    /// Local index stored at buffer `position`, if any.
    pub(crate) fn index_at(&self, position: u32) -> Option<usize> {
        let start = self.offset?;
        let end = start + self.values.len() as u32 * 2;
        if position < start || position >= end || (position - start) % 2 != 0 {
            return None;
        }
        Some(((position - start) / 2) as usize)
    }
}

/// An executable range inside a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeBlock {
    pub pos: Reg,
    pub size: u32,
}

impl CodeBlock {
    pub fn contains(&self, offset: u32) -> bool {
        offset >= self.pos.offset && offset < self.pos.offset + self.size
    }
}

/// Resident state of one script.
#[derive(Debug)]
pub struct Segment {
    id: SegmentId,
    script: u16,
    dialect: Dialect,
    state: SegmentState,
    lockers: u32,
    buf: Bytes,
    heap_start: usize,
    pub(crate) locals: LocalVariables,
    pub(crate) objects: BTreeMap<u32, Object>,
    pub(crate) code_blocks: Vec<CodeBlock>,
    pub(crate) exports: Vec<u16>,
    /// Relocated pointers, keyed by buffer position.
    pub(crate) pointers: BTreeMap<u32, Reg>,
    warnings: Vec<DataWarning>,
}

impl Segment {
    fn new(id: SegmentId, script: u16, dialect: Dialect, buf: Bytes, heap_start: usize) -> Self {
        Self {
            id,
            script,
            dialect,
            state: SegmentState::Loading,
            lockers: 1,
            buf,
            heap_start,
            locals: LocalVariables::default(),
            objects: BTreeMap::new(),
            code_blocks: Vec::new(),
            exports: Vec::new(),
            pointers: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn script(&self) -> u16 {
        self.script
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn state(&self) -> SegmentState {
        self.state
    }

    pub fn is_deleted(&self) -> bool {
        self.state == SegmentState::Deleted
    }

    pub fn lockers(&self) -> u32 {
        self.lockers
    }

    pub fn buf(&self) -> &[u8] {
        &self.buf
    }

    pub(crate) fn bytes(&self) -> Bytes {
        self.buf.clone()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Offset where the heap resource starts (0 for the block-stream dialect).
    pub fn heap_start(&self) -> usize {
        self.heap_start
    }

    pub fn locals(&self) -> &LocalVariables {
        &self.locals
    }

    pub fn locals_mut(&mut self) -> &mut LocalVariables {
        &mut self.locals
    }

    pub fn objects(&self) -> impl Iterator<Item = &Object> {
        self.objects.values()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn object_at(&self, offset: u32) -> Option<&Object> {
        self.objects.get(&offset)
    }

    pub fn code_blocks(&self) -> &[CodeBlock] {
        &self.code_blocks
    }

    pub fn is_code(&self, offset: u32) -> bool {
        self.code_blocks.iter().any(|b| b.contains(offset))
    }

    pub fn export_count(&self) -> usize {
        self.exports.len()
    }

    /// Address of exported function `index`; `None` if absent or zero.
    pub fn export(&self, index: usize) -> Option<Reg> {
        match self.exports.get(index) {
            Some(0) | None => None,
            Some(off) => Some(Reg::new(self.id, *off as u32)),
        }
    }

    /// Relocated pointer stored at buffer `position`.
    pub fn pointer_at(&self, position: u32) -> Option<Reg> {
        self.pointers.get(&position).copied()
    }

    pub fn warnings(&self) -> &[DataWarning] {
        &self.warnings
    }

    pub fn read_u16(&self, offset: usize) -> Result<u16, AccessFault> {
        let bytes = self.slice(offset, 2)?;
        Ok(LittleEndian::read_u16(bytes))
    }

    fn slice(&self, offset: usize, len: usize) -> Result<&[u8], AccessFault> {
        let end = offset.checked_add(len).filter(|end| *end <= self.buf.len());
        match end {
            Some(end) => Ok(&self.buf[offset..end]),
            None => Err(AccessFault::OutOfBounds {
                addr: Reg::new(self.id, offset as u32),
                len,
                size: self.buf.len(),
            }),
        }
    }

    /// NUL-terminated string starting at `offset`.
    pub fn c_str(&self, offset: usize) -> Option<&[u8]> {
        let tail = self.buf.get(offset..)?;
        let end = tail.iter().position(|b| *b == 0).unwrap_or(tail.len());
        Some(&tail[..end])
    }

    /// The `-name-` string of an object in this segment.
    pub fn object_name(&self, obj: &Object) -> Option<String> {
        let name = obj.name();
        if name.is_null() || (name.segment != self.id && !name.is_number()) {
            return None;
        }
        self.c_str(name.offset as usize)
            .map(|s| String::from_utf8_lossy(s).into_owned())
    }

    pub(crate) fn increment_lockers(&mut self) {
        self.lockers = self.lockers.saturating_add(1);
    }

    pub(crate) fn decrement_lockers(&mut self) {
        self.lockers = self.lockers.saturating_sub(1);
    }

    pub(crate) fn set_resident(&mut self) {
        self.state = SegmentState::Resident;
    }

    pub(crate) fn push_warning(&mut self, warning: DataWarning) {
        log::warn!("script {}: {}", self.script, warning);
        self.warnings.push(warning);
    }

    /// Drops everything but the identity; lookups fail from now on.
    pub(crate) fn mark_deleted(&mut self) {
        self.state = SegmentState::Deleted;
        self.lockers = 0;
        self.buf = Bytes::new();
        self.heap_start = 0;
        self.locals = LocalVariables::default();
        self.objects.clear();
        self.code_blocks.clear();
        self.exports.clear();
        self.pointers.clear();
    }
}

/// The set of segments, addressed by [`SegmentId`].
///
/// A script keeps the handle it was first given for the lifetime of the
/// space, so a handle never comes to name a different script.
#[derive(Debug)]
pub struct SegmentSpace {
    slots: Vec<Option<Segment>>,
    by_script: HashMap<u16, SegmentId>,
}

impl Default for SegmentSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentSpace {
    pub fn new() -> Self {
        Self {
            // slot 0 is the null segment
            slots: vec![None],
            by_script: HashMap::new(),
        }
    }

    /// Creates a fresh, `Loading` segment for `script` holding `buf`.
    pub fn allocate(
        &mut self,
        script: u16,
        dialect: Dialect,
        buf: Bytes,
        heap_start: usize,
    ) -> SegmentId {
        let id = match self.by_script.get(&script) {
            Some(id) => *id,
            None => {
                let id = SegmentId(self.slots.len() as u16);
                self.slots.push(None);
                self.by_script.insert(script, id);
                id
            }
        };
        self.slots[id.index()] = Some(Segment::new(id, script, dialect, buf, heap_start));
        id
    }

    pub fn lookup(&self, id: SegmentId) -> Result<&Segment, AccessFault> {
        match self.slot(id) {
            Some(seg) if !seg.is_deleted() => Ok(seg),
            _ => Err(AccessFault::NoSegment { segment: id }),
        }
    }

    pub fn lookup_mut(&mut self, id: SegmentId) -> Result<&mut Segment, AccessFault> {
        match self.slot_mut(id) {
            Some(seg) if !seg.is_deleted() => Ok(seg),
            _ => Err(AccessFault::NoSegment { segment: id }),
        }
    }

    /// Handle assigned to `script`, whether or not it is currently resident.
    pub fn segment_of(&self, script: u16) -> Option<SegmentId> {
        self.by_script.get(&script).copied()
    }

    pub fn script_if_loaded(&self, script: u16) -> Option<&Segment> {
        let id = self.segment_of(script)?;
        self.lookup(id).ok()
    }

    /// `len` bytes at `addr`.
    pub fn resolve(&self, addr: Reg, len: usize) -> Result<&[u8], AccessFault> {
        self.lookup(addr.segment)?.slice(addr.offset as usize, len)
    }

    pub fn object(&self, addr: Reg) -> Result<&Object, AccessFault> {
        self.lookup(addr.segment)?
            .object_at(addr.offset)
            .ok_or(AccessFault::NoObject { addr })
    }

    /// Segments that are not deleted.
    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.slots.iter().flatten().filter(|s| !s.is_deleted())
    }

    pub(crate) fn slot(&self, id: SegmentId) -> Option<&Segment> {
        self.slots.get(id.index())?.as_ref()
    }

    pub(crate) fn slot_mut(&mut self, id: SegmentId) -> Option<&mut Segment> {
        self.slots.get_mut(id.index())?.as_mut()
    }
}
