use crate::reg::Reg;

/// Marker word opening every object record.
pub const OBJECT_MAGIC: u16 = 0x1234;

/// Class id meaning "no class".
pub const NO_CLASS: u16 = 0xffff;

/// `-info-` bit marking a class record in the fixed-heap dialect.
pub const INFO_CLASS: u16 = 0x8000;

/// Where the well-known selectors live in an object's variable block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectLayout {
    /// Variables start after an 8-byte header; species first.
    Block,
    /// Variables are the object's whole record, header words included.
    Heap,
}

impl ObjectLayout {
    #[inline]
    pub(crate) fn species_index(self) -> usize {
        match self {
            ObjectLayout::Block => 0,
            ObjectLayout::Heap => 5,
        }
    }

    #[inline]
    pub(crate) fn superclass_index(self) -> usize {
        self.species_index() + 1
    }

    #[inline]
    pub(crate) fn info_index(self) -> usize {
        self.species_index() + 2
    }

    #[inline]
    pub(crate) fn name_index(self) -> usize {
        self.species_index() + 3
    }
}

/// Index of `-propDict-` in a heap-layout object.
const HEAP_PROP_DICT_INDEX: usize = 2;
/// Index of `-classScript-` in a heap-layout object.
const HEAP_CLASS_SCRIPT_INDEX: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Method {
    pub selector: u16,
    pub code: Reg,
}

/// A class or instance living inside a script segment.
#[derive(Debug, Clone)]
pub struct Object {
    pub(crate) pos: Reg,
    pub(crate) layout: ObjectLayout,
    pub(crate) is_class: bool,
    pub(crate) species: u16,
    pub(crate) superclass_id: u16,
    pub(crate) variables: Vec<Reg>,
    /// Selector id of each variable slot (the "base layout").
    pub(crate) var_selectors: Vec<u16>,
    /// Block layout keeps the property dictionary outside the variables.
    pub(crate) prop_dict: Reg,
    pub(crate) methods: Vec<Method>,
}

impl Object {
    pub fn pos(&self) -> Reg {
        self.pos
    }

    pub fn layout(&self) -> ObjectLayout {
        self.layout
    }

    pub fn is_class(&self) -> bool {
        self.is_class
    }

    /// Class id this object is a member of.
    pub fn species(&self) -> u16 {
        self.species
    }

    /// Class id of the superclass as stored in the script, [`NO_CLASS`] for none.
    pub fn superclass_id(&self) -> u16 {
        self.superclass_id
    }

    /// Resolved superclass address; null for root classes.
    pub fn superclass(&self) -> Reg {
        self.variable(self.layout.superclass_index())
            .unwrap_or(Reg::NULL)
    }

    pub(crate) fn set_superclass(&mut self, addr: Reg) {
        self.set_slot(self.layout.superclass_index(), addr);
    }

    pub fn info(&self) -> u16 {
        self.variable(self.layout.info_index())
            .map(Reg::raw)
            .unwrap_or(0)
    }

    pub fn name(&self) -> Reg {
        self.variable(self.layout.name_index()).unwrap_or(Reg::NULL)
    }

    pub fn prop_dict(&self) -> Reg {
        match self.layout {
            ObjectLayout::Block => self.prop_dict,
            ObjectLayout::Heap => self.variable(HEAP_PROP_DICT_INDEX).unwrap_or(Reg::NULL),
        }
    }

    pub(crate) fn set_prop_dict(&mut self, value: Reg) {
        match self.layout {
            ObjectLayout::Block => self.prop_dict = value,
            ObjectLayout::Heap => self.set_slot(HEAP_PROP_DICT_INDEX, value),
        }
    }

    /// `-classScript-`, only present in the heap layout.
    pub fn class_script(&self) -> Option<Reg> {
        match self.layout {
            ObjectLayout::Block => None,
            ObjectLayout::Heap => self.variable(HEAP_CLASS_SCRIPT_INDEX),
        }
    }

    pub(crate) fn set_class_script(&mut self, script: u16) {
        if self.layout == ObjectLayout::Heap {
            self.set_slot(HEAP_CLASS_SCRIPT_INDEX, Reg::number(script));
        }
    }

    pub fn variables(&self) -> &[Reg] {
        &self.variables
    }

    pub fn variable(&self, index: usize) -> Option<Reg> {
        self.variables.get(index).copied()
    }

    pub fn var_selectors(&self) -> &[u16] {
        &self.var_selectors
    }

    /// Value of the property named by `selector`, looked up through the base layout.
    pub fn property(&self, selector: u16) -> Option<Reg> {
        let index = self.var_selectors.iter().position(|s| *s == selector)?;
        self.variable(index)
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn find_method(&self, selector: u16) -> Option<Reg> {
        self.methods
            .iter()
            .find(|m| m.selector == selector)
            .map(|m| m.code)
    }

    /// Byte range covered by the variable block.
    pub(crate) fn variables_range(&self) -> std::ops::Range<u32> {
        let start = self.pos.offset;
        start..start + self.variables.len() as u32 * 2
    }

    fn set_slot(&mut self, index: usize, value: Reg) {
        if let Some(slot) = self.variables.get_mut(index) {
            *slot = value;
        } else {
            log::warn!("object {}: variable {} out of range", self.pos, index);
        }
    }

    pub(crate) fn set_variable_at(&mut self, position: u32, value: Reg) -> bool {
        let range = self.variables_range();
        if !range.contains(&position) || (position - range.start) % 2 != 0 {
            return false;
        }
        let index = ((position - range.start) / 2) as usize;
        self.variables[index] = value;
        true
    }
}
