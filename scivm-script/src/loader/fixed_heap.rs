use super::{init_locals, read_u16, read_words};
use crate::error::{DataError, Result};
use crate::lifecycle::ScriptManager;
use crate::reg::{Reg, SegmentId};
use crate::resource::ResourceProvider;
use crate::segment::{CodeBlock, Method, Object, ObjectLayout, INFO_CLASS, OBJECT_MAGIC};

/// Script resource: export count word at 6, export table from 8.
const EXPORT_COUNT_OFFSET: usize = 6;
/// Fewest words an object record can have (up to and including `-name-`).
const MIN_OBJECT_WORDS: usize = 9;

/// Reads the object record at `pos`, returning it and its size in bytes.
fn parse_object(buf: &[u8], seg: SegmentId, pos: usize, script: u16) -> Result<(Object, usize)> {
    let words = read_u16(buf, pos + 2, script, "object size")? as usize;
    if words < MIN_OBJECT_WORDS {
        return Err(DataError::MalformedBlock {
            script,
            offset: pos,
            kind: OBJECT_MAGIC,
            len: words * 2,
        }
        .into());
    }

    let variables: Vec<Reg> = read_words(buf, pos, words, script, "object record")?
        .into_iter()
        .map(Reg::number)
        .collect();

    let layout = ObjectLayout::Heap;
    let is_class = variables[layout.info_index()].raw() & INFO_CLASS != 0;
    let prop_dict_off = variables[2].raw() as usize;
    let method_dict_off = variables[3].raw() as usize;

    // Instances take their selectors from the class during wiring.
    let var_selectors = if is_class {
        read_words(buf, prop_dict_off, words, script, "property dictionary")?
    } else {
        Vec::new()
    };

    let method_count = read_u16(buf, method_dict_off, script, "method count")? as usize;
    let pairs = read_words(buf, method_dict_off + 2, method_count * 2, script, "method dictionary")?;
    let methods = pairs
        .chunks_exact(2)
        .map(|pair| Method {
            selector: pair[0],
            code: Reg::new(seg, pair[1] as u32),
        })
        .collect();

    let obj = Object {
        pos: Reg::new(seg, pos as u32),
        layout,
        is_class,
        species: variables[layout.species_index()].raw(),
        superclass_id: variables[layout.superclass_index()].raw(),
        variables,
        var_selectors,
        prop_dict: Reg::NULL,
        methods,
    };
    Ok((obj, words * 2))
}

impl<R: ResourceProvider> ScriptManager<R> {
    pub(crate) fn load_fixed_heap(&mut self, seg: SegmentId, script: u16) -> Result<()> {
        let segment = self.segment_mut(seg)?;
        let buf = segment.bytes();
        let heap = segment.heap_start();

        // The whole script resource is bytecode and dictionaries.
        segment.code_blocks.push(CodeBlock {
            pos: Reg::new(seg, 0),
            size: heap as u32,
        });

        if heap >= EXPORT_COUNT_OFFSET + 2 {
            let count = read_u16(&buf, EXPORT_COUNT_OFFSET, script, "export count")? as usize;
            segment.exports = read_words(&buf, EXPORT_COUNT_OFFSET + 2, count, script, "export table")?;
        }

        let relocation = read_u16(&buf, heap, script, "relocation offset")? as usize;
        let locals_count = read_u16(&buf, heap + 2, script, "locals count")? as usize;
        let (locals, warning) = init_locals(&buf, heap + 4, locals_count);
        segment.locals = locals;
        if let Some(warning) = warning {
            segment.push_warning(warning);
        }

        // Objects follow the declared locals, one magic-tagged record each.
        let mut cursor = heap + 4 + locals_count * 2;
        let mut classes = Vec::new();
        while read_u16(&buf, cursor, script, "object magic").ok() == Some(OBJECT_MAGIC) {
            let (obj, size) = parse_object(&buf, seg, cursor, script)?;
            if obj.is_class {
                classes.push((obj.species, cursor as u32));
            }
            self.segment_mut(seg)?.objects.insert(obj.pos.offset, obj);
            cursor += size;
        }

        for (species, pos) in classes {
            self.register_class(seg, script, species, pos)?;
        }

        self.wire_objects(seg, script)?;

        if relocation != 0 {
            self.relocate(seg, script, heap + relocation, heap)?;
        }

        Ok(())
    }
}
