//! Script lifecycle: locker counting, loading on demand and cascading release.
//!
//! State machine per script segment:
//!
//! - `Unloaded -> Resident(1)` on the first `instantiate`
//! - `Resident(n) -> Resident(n + 1)` on every further `instantiate`
//! - `Resident(n > 1) -> Resident(n - 1)` on `uninstantiate`
//! - `Resident(1) -> Deleted` on `uninstantiate`
//! - `Deleted -> Resident(1)` on `instantiate` (reload under the same handle)

use std::collections::HashSet;

use bytes::BytesMut;

use crate::class_table::ClassTable;
use crate::config::{Dialect, VmConfig};
use crate::error::{AccessFault, DataError, Result};
use crate::opcode::OpcodeFormats;
use crate::reg::{Reg, SegmentId};
use crate::resource::ResourceProvider;
use crate::segment::{Segment, SegmentSpace, SegmentState, NO_CLASS};

/// Owns every resident script and the class table that links them.
///
/// Not `Clone`: segments carry locker counts that must stay unique.
#[derive(Debug)]
pub struct ScriptManager<R> {
    pub(crate) config: VmConfig,
    resources: R,
    pub(crate) segments: SegmentSpace,
    pub(crate) classes: ClassTable,
    formats: OpcodeFormats,

    // scripts with a load in progress, outermost first
    loading: Vec<u16>,
    // scripts whose release is in progress further up the stack
    releasing: HashSet<u16>,
}

impl<R: ResourceProvider> ScriptManager<R> {
    pub fn new(config: VmConfig, mut resources: R) -> Result<Self> {
        let vocabulary = resources
            .class_vocabulary()
            .map_err(DataError::MissingVocabulary)?;
        let classes = ClassTable::from_vocabulary(&vocabulary)?;
        log::debug!("class table: {} entries", classes.len());

        let formats = OpcodeFormats::new(&config);
        Ok(Self {
            config,
            resources,
            segments: SegmentSpace::new(),
            classes,
            formats,
            loading: Vec::new(),
            releasing: HashSet::new(),
        })
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn segments(&self) -> &SegmentSpace {
        &self.segments
    }

    pub fn classes(&self) -> &ClassTable {
        &self.classes
    }

    pub fn opcode_formats(&self) -> &OpcodeFormats {
        &self.formats
    }

    pub fn resources(&self) -> &R {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut R {
        &mut self.resources
    }

    /// Lockers of `script`, `None` unless it is resident.
    pub fn lockers(&self, script: u16) -> Option<u32> {
        self.segments.script_if_loaded(script).map(Segment::lockers)
    }

    /// State of the segment `script` was last loaded into, deleted ones included.
    pub fn segment_state(&self, script: u16) -> Option<SegmentState> {
        let id = self.segments.segment_of(script)?;
        self.segments.slot(id).map(Segment::state)
    }

    pub fn is_loaded(&self, script: u16) -> bool {
        self.segments.script_if_loaded(script).is_some()
    }

    /// Entry point of exported function `index` of a resident script.
    pub fn export_address(&self, script: u16, index: usize) -> std::result::Result<Reg, AccessFault> {
        let segment = self
            .segments
            .script_if_loaded(script)
            .ok_or(AccessFault::NoSegment {
                segment: self.segments.segment_of(script).unwrap_or(SegmentId::NONE),
            })?;
        segment
            .export(index)
            .ok_or(AccessFault::NoExport { script, index })
    }

    pub(crate) fn segment_mut(&mut self, id: SegmentId) -> std::result::Result<&mut Segment, AccessFault> {
        self.segments
            .slot_mut(id)
            .ok_or(AccessFault::NoSegment { segment: id })
    }

    /// Makes `script` resident and takes one locker on it.
    ///
    /// A resident script only gains a locker; anything else is (re)loaded
    /// from the resource provider.
    pub fn instantiate(&mut self, script: u16) -> Result<SegmentId> {
        if self.loading.contains(&script) {
            let mut chain = self.loading.clone();
            chain.push(script);
            return Err(DataError::CircularDependency { script, chain }.into());
        }

        if let Some(id) = self.segments.segment_of(script) {
            if let Some(segment) = self.segments.slot_mut(id) {
                if segment.state() == SegmentState::Resident {
                    segment.increment_lockers();
                    return Ok(id);
                }
            }
        }

        self.load(script)
    }

    fn load(&mut self, script: u16) -> Result<SegmentId> {
        let dialect = self.config.dialect;
        let data = self
            .resources
            .script(script)
            .map_err(|source| DataError::Resource { script, source })?;

        let (buf, heap_start) = match dialect {
            Dialect::BlockStream => (data, 0),
            Dialect::FixedHeap => {
                let heap = self
                    .resources
                    .heap(script)
                    .map_err(|source| DataError::MissingHeap { script, source })?;
                let mut buf = BytesMut::with_capacity(data.len() + heap.len());
                buf.extend_from_slice(&data);
                buf.extend_from_slice(&heap);
                (buf.freeze(), data.len())
            }
        };

        let id = self.segments.allocate(script, dialect, buf, heap_start);
        log::debug!("loading script {} into segment {} ({:?})", script, id, dialect);

        self.loading.push(script);
        let loaded = match dialect {
            Dialect::BlockStream => self.load_block_stream(id, script),
            Dialect::FixedHeap => self.load_fixed_heap(id, script),
        };
        self.loading.pop();

        match loaded {
            Ok(()) => {
                let segment = self.segment_mut(id)?;
                segment.set_resident();
                log::debug!(
                    "loaded script {}: {} objects, {} locals",
                    script,
                    segment.object_count(),
                    segment.locals().len()
                );
                Ok(id)
            }
            Err(e) => {
                log::debug!("script {} failed to load: {}", script, e);
                self.discard(id);
                Err(e)
            }
        }
    }

    /// Drops a half-loaded segment. Scripts it pulled in keep their lockers.
    fn discard(&mut self, id: SegmentId) {
        self.classes.clear_segment(id);
        if let Some(segment) = self.segments.slot_mut(id) {
            segment.mark_deleted();
        }
    }

    /// Releases one locker on `script`, unloading it when none remain.
    ///
    /// Releasing a script that is not resident is a harmless no-op.
    pub fn uninstantiate(&mut self, script: u16) {
        let Some(id) = self.segments.script_if_loaded(script).map(Segment::id) else {
            log::warn!("unloading script {} requested although not loaded", script);
            return;
        };
        if self.releasing.contains(&script) {
            log::debug!("script {} is already being released", script);
            return;
        }

        let Ok(segment) = self.segment_mut(id) else {
            return;
        };
        segment.decrement_lockers();
        if segment.lockers() > 0 {
            return;
        }
        let dialect = segment.dialect();
        let superclasses: Vec<u16> = segment
            .objects()
            .map(|obj| obj.superclass_id())
            .filter(|class| *class != NO_CLASS)
            .collect();

        self.classes.clear_segment(id);

        if dialect == Dialect::BlockStream {
            self.releasing.insert(script);
            for class in superclasses {
                let Some(owner) = self.classes.entry(class).and_then(|e| e.script) else {
                    continue;
                };
                if owner == script {
                    if let Ok(segment) = self.segment_mut(id) {
                        segment.decrement_lockers();
                    }
                } else {
                    self.uninstantiate(owner);
                }
            }
            self.releasing.remove(&script);
        }

        let Ok(segment) = self.segment_mut(id) else {
            return;
        };
        if segment.lockers() > 0 {
            return;
        }
        segment.mark_deleted();
        log::debug!("unloaded script {}", script);
    }

    /// Address of class `class`, loading its declaring script if needed.
    ///
    /// When the class lives in another segment than `caller`, that segment
    /// gains a locker.
    pub fn get_class_address(&mut self, class: u16, caller: Reg) -> Result<Reg> {
        if class == NO_CLASS {
            return Ok(Reg::NULL);
        }

        let size = self.classes.len();
        let entry = match self.classes.entry(class) {
            Some(entry) => *entry,
            None => return Err(DataError::NoSuchClass { class, size }.into()),
        };
        let Some(script) = entry.script else {
            return Err(DataError::NoSuchClass { class, size }.into());
        };

        if entry.reg.is_null() {
            self.instantiate(script)?;
            let reg = self.classes.entry(class).map_or(Reg::NULL, |e| e.reg);
            if reg.is_null() {
                return Err(DataError::UnresolvedClass { class, script }.into());
            }
            return Ok(reg);
        }

        if caller.segment != entry.reg.segment {
            self.segment_mut(entry.reg.segment)?.increment_lockers();
        }
        Ok(entry.reg)
    }
}
