//! Developer-facing utilities for building synthetic script resources.
//!
//! This is intentionally a module (not `src/bin/...`) so it can be reused
//! from unit tests, integration tests and host crates.

use crate::segment::{INFO_CLASS, NO_CLASS, OBJECT_MAGIC};

fn push_word(buf: &mut Vec<u8>, word: u16) {
    buf.extend_from_slice(&word.to_le_bytes());
}

fn put_word(buf: &mut [u8], offset: usize, word: u16) {
    buf[offset..offset + 2].copy_from_slice(&word.to_le_bytes());
}

/// Class vocabulary declaring class `i` in `scripts[i]`.
pub fn vocabulary(scripts: &[u16]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(scripts.len() * 4);
    for script in scripts {
        push_word(&mut buf, 0);
        push_word(&mut buf, *script);
    }
    buf
}

/// Description of an object or class record.
///
/// Variables are `species`, `superclass`, `info`, `name` followed by the
/// extra properties in insertion order.
#[derive(Debug, Clone)]
pub struct ObjectSpec {
    pub species: u16,
    pub superclass: u16,
    pub info: u16,
    pub name: u16,
    pub properties: Vec<(u16, u16)>,
    pub methods: Vec<(u16, u16)>,
}

impl ObjectSpec {
    pub fn new(species: u16) -> Self {
        Self {
            species,
            superclass: NO_CLASS,
            info: 0,
            name: 0,
            properties: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn superclass(mut self, class: u16) -> Self {
        self.superclass = class;
        self
    }

    pub fn info(mut self, info: u16) -> Self {
        self.info = info;
        self
    }

    pub fn name(mut self, offset: u16) -> Self {
        self.name = offset;
        self
    }

    pub fn property(mut self, selector: u16, value: u16) -> Self {
        self.properties.push((selector, value));
        self
    }

    pub fn method(mut self, selector: u16, code: u16) -> Self {
        self.methods.push((selector, code));
        self
    }
}

/// Block-stream script builder.
#[derive(Debug, Clone, Default)]
pub struct ScriptBuilder {
    buf: Vec<u8>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script opening with the early locals-count header word.
    pub fn legacy(locals: u16) -> Self {
        let mut buf = Vec::new();
        push_word(&mut buf, locals);
        Self { buf }
    }

    /// Buffer offset of the payload of the next block added.
    pub fn next_payload_offset(&self) -> usize {
        self.buf.len() + 4
    }

    /// Buffer offset of the object position of the next object/class added.
    pub fn next_object_position(&self) -> usize {
        self.next_payload_offset() + 8
    }

    pub fn raw_block(mut self, kind: u16, payload: &[u8]) -> Self {
        push_word(&mut self.buf, kind);
        push_word(&mut self.buf, (payload.len() + 4) as u16);
        self.buf.extend_from_slice(payload);
        self
    }

    pub fn locals(self, values: &[u16]) -> Self {
        let mut payload = Vec::new();
        for v in values {
            push_word(&mut payload, *v);
        }
        self.raw_block(10, &payload)
    }

    /// Locals block whose header claims `declared` variables but carries only `values`.
    ///
    /// Must be the last block; build with [`ScriptBuilder::build_unterminated`].
    pub fn truncated_locals(mut self, declared: usize, values: &[u16]) -> Self {
        push_word(&mut self.buf, 10);
        push_word(&mut self.buf, (declared * 2 + 4) as u16);
        for v in values {
            push_word(&mut self.buf, *v);
        }
        self
    }

    pub fn code(self, bytes: &[u8]) -> Self {
        self.raw_block(2, bytes)
    }

    pub fn exports(self, offsets: &[u16]) -> Self {
        self.counted_block(7, offsets)
    }

    /// Relocation table; positions are absolute buffer offsets.
    pub fn pointers(self, positions: &[u16]) -> Self {
        self.counted_block(8, positions)
    }

    fn counted_block(self, kind: u16, words: &[u16]) -> Self {
        let mut payload = Vec::new();
        push_word(&mut payload, words.len() as u16);
        for w in words {
            push_word(&mut payload, *w);
        }
        self.raw_block(kind, &payload)
    }

    pub fn object(self, spec: ObjectSpec) -> Self {
        let payload = Self::object_payload(&spec, false);
        self.raw_block(1, &payload)
    }

    pub fn class(self, spec: ObjectSpec) -> Self {
        let payload = Self::object_payload(&spec, true);
        self.raw_block(6, &payload)
    }

    fn object_payload(spec: &ObjectSpec, is_class: bool) -> Vec<u8> {
        let mut values = vec![spec.species, spec.superclass, spec.info, spec.name];
        let mut selectors = vec![0, 1, 2, 3];
        for (selector, value) in &spec.properties {
            selectors.push(*selector);
            values.push(*value);
        }

        let n = values.len();
        let dict = if is_class { n * 2 } else { 0 };
        // method count word sits right before the method area
        let method_area = n * 2 + dict + 2;

        let mut payload = Vec::new();
        push_word(&mut payload, OBJECT_MAGIC);
        push_word(&mut payload, 0);
        push_word(&mut payload, method_area as u16);
        push_word(&mut payload, n as u16);
        for v in values {
            push_word(&mut payload, v);
        }
        if is_class {
            for s in selectors {
                push_word(&mut payload, s);
            }
        }
        push_word(&mut payload, spec.methods.len() as u16);
        for (selector, _) in &spec.methods {
            push_word(&mut payload, *selector);
        }
        push_word(&mut payload, 0);
        for (_, code) in &spec.methods {
            push_word(&mut payload, *code);
        }
        payload
    }

    /// Finishes the script with a terminator block.
    pub fn build(mut self) -> Vec<u8> {
        push_word(&mut self.buf, 0);
        self.buf
    }

    pub fn build_unterminated(self) -> Vec<u8> {
        self.buf
    }
}

/// Script/heap resource pair in the fixed-heap dialect.
#[derive(Debug, Clone)]
pub struct HeapScript {
    pub script: Vec<u8>,
    pub heap: Vec<u8>,
    /// Object positions in the combined buffer, in declaration order.
    pub objects: Vec<usize>,
}

impl HeapScript {
    pub fn heap_start(&self) -> usize {
        self.script.len()
    }
}

/// Fixed-heap script builder.
#[derive(Debug, Clone, Default)]
pub struct HeapScriptBuilder {
    exports: Vec<u16>,
    code: Vec<u8>,
    locals: Vec<u16>,
    objects: Vec<(ObjectSpec, bool)>,
    pointers: Vec<u16>,
}

impl HeapScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exports(mut self, offsets: &[u16]) -> Self {
        self.exports = offsets.to_vec();
        self
    }

    pub fn code(mut self, bytes: &[u8]) -> Self {
        self.code = bytes.to_vec();
        self
    }

    pub fn locals(mut self, values: &[u16]) -> Self {
        self.locals = values.to_vec();
        self
    }

    pub fn object(mut self, spec: ObjectSpec) -> Self {
        self.objects.push((spec, false));
        self
    }

    pub fn class(mut self, spec: ObjectSpec) -> Self {
        self.objects.push((spec, true));
        self
    }

    /// Relocation table; positions are relative to the heap start.
    pub fn pointers(mut self, positions: &[u16]) -> Self {
        self.pointers = positions.to_vec();
        self
    }

    pub fn build(self) -> HeapScript {
        let mut script = vec![0u8; 6];
        push_word(&mut script, self.exports.len() as u16);
        for off in &self.exports {
            push_word(&mut script, *off);
        }
        script.extend_from_slice(&self.code);

        // dictionaries live in the script resource
        let mut dicts = Vec::with_capacity(self.objects.len());
        for (spec, _) in &self.objects {
            let prop_dict = script.len();
            for selector in 0..9u16 {
                push_word(&mut script, selector);
            }
            for (selector, _) in &spec.properties {
                push_word(&mut script, *selector);
            }
            let method_dict = script.len();
            push_word(&mut script, spec.methods.len() as u16);
            for (selector, code) in &spec.methods {
                push_word(&mut script, *selector);
                push_word(&mut script, *code);
            }
            dicts.push((prop_dict as u16, method_dict as u16));
        }

        let heap_start = script.len();
        let mut heap = Vec::new();
        push_word(&mut heap, 0);
        push_word(&mut heap, self.locals.len() as u16);
        for v in &self.locals {
            push_word(&mut heap, *v);
        }

        let mut objects = Vec::with_capacity(self.objects.len());
        for ((spec, is_class), (prop_dict, method_dict)) in self.objects.iter().zip(dicts) {
            objects.push(heap_start + heap.len());
            let info = if *is_class { spec.info | INFO_CLASS } else { spec.info };
            let words = [
                OBJECT_MAGIC,
                (9 + spec.properties.len()) as u16,
                prop_dict,
                method_dict,
                0,
                spec.species,
                spec.superclass,
                info,
                spec.name,
            ];
            for w in words {
                push_word(&mut heap, w);
            }
            for (_, value) in &spec.properties {
                push_word(&mut heap, *value);
            }
        }
        push_word(&mut heap, 0);

        if !self.pointers.is_empty() {
            let table = heap.len() as u16;
            put_word(&mut heap, 0, table);
            push_word(&mut heap, self.pointers.len() as u16);
            for p in &self.pointers {
                push_word(&mut heap, *p);
            }
        }

        HeapScript {
            script,
            heap,
            objects,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{parse_blocks, BlockKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn vocabulary_layout() {
        assert_eq!(vocabulary(&[5, 0x102]), vec![0, 0, 5, 0, 0, 0, 2, 1]);
    }

    #[test]
    fn built_blocks_parse_back() {
        let builder = ScriptBuilder::new().locals(&[1, 2, 3]);
        let class_pos = builder.next_object_position();
        let buf = builder
            .class(ObjectSpec::new(4).method(0x20, 0x40))
            .code(&[0x48])
            .build();

        let kinds: Vec<_> = parse_blocks(&buf, 0, 0)
            .unwrap()
            .iter()
            .map(|b| b.kind)
            .collect();
        assert_eq!(kinds, vec![BlockKind::LocalVars, BlockKind::Class, BlockKind::Code]);
        assert_eq!(class_pos, 10 + 12);
        assert_eq!(u16::from_le_bytes([buf[class_pos], buf[class_pos + 1]]), 4);
    }

    #[test]
    fn heap_objects_follow_locals() {
        let built = HeapScriptBuilder::new()
            .locals(&[7, 8])
            .class(ObjectSpec::new(1))
            .pointers(&[4])
            .build();
        let h = built.heap_start();
        assert_eq!(built.objects, vec![h + 8]);
        assert_eq!(&built.heap[8..10], &OBJECT_MAGIC.to_le_bytes());
        // relocation table comes after the object list terminator
        let table = u16::from_le_bytes([built.heap[0], built.heap[1]]) as usize;
        assert_eq!(table, 8 + 18 + 2);
        assert_eq!(&built.heap[table..], &[1, 0, 4, 0]);
    }
}
