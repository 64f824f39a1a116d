//! Turns raw script resources into populated segments.
//!
//! Both dialects follow the same shape: parse everything that needs no other
//! script into the segment, register classes, then wire superclasses (which
//! may load further scripts) and finally apply the relocation table.

mod block_stream;
mod fixed_heap;

pub use block_stream::{parse_blocks, Block, BlockKind};

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{DataError, DataWarning, Result};
use crate::lifecycle::ScriptManager;
use crate::reg::{Reg, SegmentId};
use crate::resource::ResourceProvider;
use crate::segment::{LocalVariables, NO_CLASS};

pub(crate) fn read_u16(buf: &[u8], offset: usize, script: u16, what: &'static str) -> std::result::Result<u16, DataError> {
    match buf.get(offset..offset + 2) {
        Some(word) => Ok(LittleEndian::read_u16(word)),
        None => Err(DataError::Truncated {
            script,
            what,
            offset,
            need: 2,
            len: buf.len(),
        }),
    }
}

pub(crate) fn read_words(
    buf: &[u8],
    offset: usize,
    count: usize,
    script: u16,
    what: &'static str,
) -> std::result::Result<Vec<u16>, DataError> {
    let need = count * 2;
    let words = buf.get(offset..offset + need).ok_or(DataError::Truncated {
        script,
        what,
        offset,
        need,
        len: buf.len(),
    })?;
    Ok(words.chunks_exact(2).map(LittleEndian::read_u16).collect())
}

/// Reads `declared` locals at `offset`, clamping to what the buffer holds.
pub(crate) fn init_locals(
    buf: &[u8],
    offset: usize,
    declared: usize,
) -> (LocalVariables, Option<DataWarning>) {
    let available = buf.len().saturating_sub(offset) / 2;
    let (count, warning) = if declared > available {
        (
            available,
            Some(DataWarning::LocalsTruncated {
                offset,
                declared,
                kept: available,
            }),
        )
    } else {
        (declared, None)
    };

    let words = buf.get(offset..offset + count * 2).unwrap_or(&[]);
    (LocalVariables::from_words(offset as u32, words), warning)
}

impl<R: ResourceProvider> ScriptManager<R> {
    /// Records a class declared by the segment being loaded.
    pub(crate) fn register_class(&mut self, seg: SegmentId, script: u16, species: u16, pos: u32) -> Result<()> {
        let warning = self
            .classes
            .register_species(species, Reg::new(seg, pos), script)?;
        if let Some(warning) = warning {
            self.segment_mut(seg)?.push_warning(warning);
        }
        Ok(())
    }

    /// Resolves the superclass of every object in `seg` and copies the base
    /// layout and property dictionary into instances.
    pub(crate) fn wire_objects(&mut self, seg: SegmentId, script: u16) -> Result<()> {
        let positions: Vec<(u32, u16)> = self
            .segment_mut(seg)?
            .objects
            .values()
            .map(|obj| (obj.pos.offset, obj.superclass_id))
            .collect();

        for (offset, superclass_id) in positions {
            let pos = Reg::new(seg, offset);
            let superclass = self.get_class_address(superclass_id, pos)?;

            let base = if superclass.is_null() {
                None
            } else {
                let class_obj = self
                    .segments
                    .slot(superclass.segment)
                    .and_then(|s| s.object_at(superclass.offset))
                    .ok_or(DataError::MissingClassObject {
                        class: superclass_id,
                        addr: superclass,
                        script,
                    })?;
                Some((class_obj.var_selectors.clone(), class_obj.prop_dict()))
            };

            let Some(obj) = self.segment_mut(seg)?.objects.get_mut(&offset) else {
                continue;
            };
            obj.set_superclass(superclass);
            obj.set_class_script(script);

            if let Some((selectors, prop_dict)) = base {
                if !obj.is_class {
                    obj.var_selectors = selectors;
                    obj.set_prop_dict(prop_dict);
                }
            }

            log::trace!(
                "script {}: object {} species={} superclass={} ({})",
                script,
                pos,
                obj.species,
                if superclass_id == NO_CLASS { "none".to_string() } else { superclass_id.to_string() },
                superclass
            );
        }
        Ok(())
    }

    /// Applies the relocation table at `table`; entries are relative to `base`.
    pub(crate) fn relocate(&mut self, seg: SegmentId, script: u16, table: usize, base: usize) -> Result<()> {
        let segment = self.segment_mut(seg)?;
        let buf = segment.bytes();

        let count = read_u16(&buf, table, script, "relocation count")? as usize;
        let entries = read_words(&buf, table + 2, count, script, "relocation table")?;

        for entry in entries {
            let position = base + entry as usize;
            let Some(raw) = buf.get(position..position + 2) else {
                segment.push_warning(DataWarning::RelocationOutOfBounds {
                    position,
                    len: buf.len(),
                });
                continue;
            };

            let reg = Reg::new(seg, LittleEndian::read_u16(raw) as u32);
            let position = position as u32;
            segment.pointers.insert(position, reg);

            if let Some(index) = segment.locals.index_at(position) {
                // index_at only yields in-range slots
                let _ = segment.locals.set(index, reg);
                continue;
            }
            if let Some((_, obj)) = segment.objects.range_mut(..=position).next_back() {
                obj.set_variable_at(position, reg);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn locals_within_buffer_keep_literals() {
        let buf = [0xff, 0xff, 1, 0, 2, 0, 3, 0];
        let (locals, warning) = init_locals(&buf, 2, 3);
        assert_eq!(warning, None);
        assert_eq!(
            locals.as_slice(),
            &[Reg::number(1), Reg::number(2), Reg::number(3)]
        );
        assert_eq!(locals.offset(), Some(2));
    }

    #[test]
    fn oversized_locals_are_clamped() {
        let buf = [0, 0, 1, 0, 2, 0, 3];
        let (locals, warning) = init_locals(&buf, 2, 40);
        assert_eq!(locals.len(), 2);
        assert_eq!(
            warning,
            Some(DataWarning::LocalsTruncated {
                offset: 2,
                declared: 40,
                kept: 2
            })
        );

        let (locals, warning) = init_locals(&buf, 100, 1);
        assert!(locals.is_empty());
        assert!(warning.is_some());
    }

    #[test]
    fn short_reads_report_truncation() {
        let err = read_words(&[1, 0, 2], 0, 2, 9, "selectors").unwrap_err();
        assert!(matches!(
            err,
            DataError::Truncated {
                script: 9,
                need: 4,
                len: 3,
                ..
            }
        ));
        assert_eq!(read_u16(&[1, 0, 2, 1], 2, 9, "word").unwrap(), 0x0102);
    }
}
