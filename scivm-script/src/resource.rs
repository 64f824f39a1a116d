//! Resource access.
//!
//! Archive lookup and decompression belong to the host; the loader only asks
//! for finished byte buffers through [`ResourceProvider`].

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use bytes::Bytes;

pub trait ResourceProvider {
    /// Raw bytes of script resource `number`.
    fn script(&mut self, number: u16) -> Result<Bytes>;

    /// Heap resource paired with script `number` (fixed-heap dialect only).
    fn heap(&mut self, number: u16) -> Result<Bytes> {
        Err(anyhow!("no heap resource for script {number}"))
    }

    /// The class vocabulary: one `(padding, script)` pair of LE words per class id.
    fn class_vocabulary(&mut self) -> Result<Bytes>;
}

impl<R: ResourceProvider + ?Sized> ResourceProvider for &mut R {
    fn script(&mut self, number: u16) -> Result<Bytes> {
        (**self).script(number)
    }

    fn heap(&mut self, number: u16) -> Result<Bytes> {
        (**self).heap(number)
    }

    fn class_vocabulary(&mut self) -> Result<Bytes> {
        (**self).class_vocabulary()
    }
}

/// Resources held in memory, keyed by script number.
///
/// Counts script fetches so hosts and tests can tell a fresh load from a
/// locker bump.
#[derive(Debug, Default, Clone)]
pub struct MemoryResources {
    vocabulary: Option<Bytes>,
    scripts: HashMap<u16, Bytes>,
    heaps: HashMap<u16, Bytes>,
    fetches: HashMap<u16, usize>,
}

impl MemoryResources {
    pub fn new(vocabulary: impl Into<Bytes>) -> Self {
        Self {
            vocabulary: Some(vocabulary.into()),
            ..Default::default()
        }
    }

    pub fn insert_script(&mut self, number: u16, data: impl Into<Bytes>) -> &mut Self {
        self.scripts.insert(number, data.into());
        self
    }

    pub fn insert_heap(&mut self, number: u16, data: impl Into<Bytes>) -> &mut Self {
        self.heaps.insert(number, data.into());
        self
    }

    pub fn with_script(mut self, number: u16, data: impl Into<Bytes>) -> Self {
        self.insert_script(number, data);
        self
    }

    pub fn with_heap(mut self, number: u16, data: impl Into<Bytes>) -> Self {
        self.insert_heap(number, data);
        self
    }

    /// How many times script `number` has been fetched.
    pub fn fetch_count(&self, number: u16) -> usize {
        self.fetches.get(&number).copied().unwrap_or(0)
    }
}

impl ResourceProvider for MemoryResources {
    fn script(&mut self, number: u16) -> Result<Bytes> {
        let data = self
            .scripts
            .get(&number)
            .cloned()
            .ok_or_else(|| anyhow!("script.{number:03} not found"))?;
        *self.fetches.entry(number).or_insert(0) += 1;
        Ok(data)
    }

    fn heap(&mut self, number: u16) -> Result<Bytes> {
        self.heaps
            .get(&number)
            .cloned()
            .ok_or_else(|| anyhow!("heap.{number:03} not found"))
    }

    fn class_vocabulary(&mut self) -> Result<Bytes> {
        self.vocabulary
            .clone()
            .ok_or_else(|| anyhow!("vocab.996 not found"))
    }
}
