use byteorder::{ByteOrder, LittleEndian};

use super::{init_locals, read_u16, read_words};
use crate::error::{DataError, Result};
use crate::lifecycle::ScriptManager;
use crate::reg::{Reg, SegmentId};
use crate::resource::ResourceProvider;
use crate::segment::{CodeBlock, LocalVariables, Method, Object, ObjectLayout};

/// Block header: type word + length word (length includes the header).
const BLOCK_HEADER_SIZE: usize = 4;
/// Object position relative to its block payload: magic, locals offset,
/// method area offset, variable count.
const OBJECT_HEADER_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Object,
    Code,
    Synonyms,
    Said,
    Strings,
    Class,
    Exports,
    Pointers,
    PreloadText,
    LocalVars,
    Other(u16),
}

impl From<u16> for BlockKind {
    fn from(value: u16) -> Self {
        match value {
            1 => BlockKind::Object,
            2 => BlockKind::Code,
            3 => BlockKind::Synonyms,
            4 => BlockKind::Said,
            5 => BlockKind::Strings,
            6 => BlockKind::Class,
            7 => BlockKind::Exports,
            8 => BlockKind::Pointers,
            9 => BlockKind::PreloadText,
            10 => BlockKind::LocalVars,
            other => BlockKind::Other(other),
        }
    }
}

/// One `{type, length, payload}` record of a block-stream script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    /// Offset of the block header.
    pub offset: usize,
    /// Declared length, header included. May run past the buffer.
    pub len: usize,
}

impl Block {
    #[inline]
    pub fn payload(&self) -> usize {
        self.offset + BLOCK_HEADER_SIZE
    }

    #[inline]
    pub fn payload_len(&self) -> usize {
        self.len - BLOCK_HEADER_SIZE
    }
}

/// Splits a block-stream buffer into block descriptors, starting at `start`.
///
/// Scanning ends at a zero type word or when no complete header is left.
pub fn parse_blocks(buf: &[u8], start: usize, script: u16) -> std::result::Result<Vec<Block>, DataError> {
    let mut blocks = Vec::new();
    let mut offset = start;

    while offset + BLOCK_HEADER_SIZE <= buf.len() {
        let kind = LittleEndian::read_u16(&buf[offset..]);
        if kind == 0 {
            break;
        }
        let len = LittleEndian::read_u16(&buf[offset + 2..]) as usize;
        if len < BLOCK_HEADER_SIZE {
            return Err(DataError::MalformedBlock {
                script,
                offset,
                kind,
                len,
            });
        }

        blocks.push(Block {
            kind: BlockKind::from(kind),
            offset,
            len,
        });
        offset += len;
    }

    Ok(blocks)
}

/// Reads the object or class whose block payload starts at `payload`.
fn parse_object(buf: &[u8], seg: SegmentId, payload: usize, is_class: bool, script: u16) -> Result<Object> {
    let pos = payload + OBJECT_HEADER_SIZE;
    let method_area_offset = read_u16(buf, pos - 4, script, "object method area offset")? as usize;
    let count = read_u16(buf, pos - 2, script, "object variable count")? as usize;

    let variables = read_words(buf, pos, count, script, "object variables")?
        .into_iter()
        .map(Reg::number)
        .collect::<Vec<_>>();

    // Classes carry their selector ids right after the values.
    let (var_selectors, prop_dict) = if is_class {
        let at = pos + count * 2;
        let selectors = read_words(buf, at, count, script, "class selectors")?;
        (selectors, Reg::new(seg, at as u32))
    } else {
        (Vec::new(), Reg::NULL)
    };

    let area = pos + method_area_offset;
    let method_count = read_u16(buf, area - 2, script, "method count")? as usize;
    let selectors = read_words(buf, area, method_count, script, "method selectors")?;
    let code = read_words(buf, area + (method_count + 1) * 2, method_count, script, "method offsets")?;
    let methods = selectors
        .into_iter()
        .zip(code)
        .map(|(selector, off)| Method {
            selector,
            code: Reg::new(seg, off as u32),
        })
        .collect();

    let layout = ObjectLayout::Block;
    let species = variables.get(layout.species_index()).map_or(0, |r| r.raw());
    let superclass_id = variables
        .get(layout.superclass_index())
        .map_or(crate::segment::NO_CLASS, |r| r.raw());

    Ok(Object {
        pos: Reg::new(seg, pos as u32),
        layout,
        is_class,
        species,
        superclass_id,
        variables,
        var_selectors,
        prop_dict,
        methods,
    })
}

impl<R: ResourceProvider> ScriptManager<R> {
    pub(crate) fn load_block_stream(&mut self, seg: SegmentId, script: u16) -> Result<()> {
        let buf = self.segment_mut(seg)?.bytes();

        let mut start = 0;
        if self.config.legacy_header {
            // No locals block in this variant; the count comes first and the
            // locals start out zeroed.
            let count = read_u16(&buf, 0, script, "locals count")? as usize;
            if count > 0 {
                self.segment_mut(seg)?.locals = LocalVariables::zeroed(count);
            }
            start = 2;
        }

        let blocks = parse_blocks(&buf, start, script)?;

        // First pass: locals and class registration.
        for block in &blocks {
            match block.kind {
                BlockKind::LocalVars => {
                    let (locals, warning) = init_locals(&buf, block.payload(), block.payload_len() / 2);
                    let segment = self.segment_mut(seg)?;
                    segment.locals = locals;
                    if let Some(warning) = warning {
                        segment.push_warning(warning);
                    }
                }
                BlockKind::Class => {
                    let pos = block.payload() + OBJECT_HEADER_SIZE;
                    let species = read_u16(&buf, pos, script, "class species")?;
                    self.register_class(seg, script, species, pos as u32)?;
                }
                _ => {}
            }
        }

        // Second pass: code, objects, exports, relocation table.
        let mut relocation = None;
        for block in &blocks {
            match block.kind {
                BlockKind::Code => {
                    let size = block.payload_len().min(buf.len().saturating_sub(block.payload()));
                    self.segment_mut(seg)?.code_blocks.push(CodeBlock {
                        pos: Reg::new(seg, block.payload() as u32),
                        size: size as u32,
                    });
                }
                BlockKind::Object | BlockKind::Class => {
                    let obj = parse_object(&buf, seg, block.payload(), block.kind == BlockKind::Class, script)?;
                    self.segment_mut(seg)?.objects.insert(obj.pos.offset, obj);
                }
                BlockKind::Exports => {
                    let count = read_u16(&buf, block.payload(), script, "export count")? as usize;
                    let exports = read_words(&buf, block.payload() + 2, count, script, "export table")?;
                    self.segment_mut(seg)?.exports = exports;
                }
                BlockKind::Pointers => relocation = Some(block.payload()),
                _ => {}
            }
        }

        self.wire_objects(seg, script)?;

        if let Some(table) = relocation {
            self.relocate(seg, script, table, 0)?;
        }

        Ok(())
    }
}
