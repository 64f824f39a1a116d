use anyhow::anyhow;
use byteorder::{ByteOrder, LittleEndian};

use crate::error::{DataError, DataWarning};
use crate::reg::{Reg, SegmentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassEntry {
    /// Declaring script; `None` for entries without a known script.
    pub script: Option<u16>,
    /// Resolved address, null until the declaring script is instantiated.
    pub reg: Reg,
}

/// Global class id -> (declaring script, address) registry.
#[derive(Debug, Clone, Default)]
pub struct ClassTable {
    entries: Vec<ClassEntry>,
}

impl ClassTable {
    /// Builds the table from the class vocabulary: one `(padding, script)`
    /// pair of little-endian words per class id.
    pub fn from_vocabulary(data: &[u8]) -> Result<Self, DataError> {
        let total = data.len() / 4;
        if total == 0 {
            return Err(DataError::MissingVocabulary(anyhow!(
                "vocabulary holds no classes ({} bytes)",
                data.len()
            )));
        }

        let entries = data
            .chunks_exact(4)
            .map(|pair| ClassEntry {
                script: Some(LittleEndian::read_u16(&pair[2..4])),
                reg: Reg::NULL,
            })
            .collect();

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, class: u16) -> Option<&ClassEntry> {
        self.entries.get(class as usize)
    }

    pub fn entries(&self) -> &[ClassEntry] {
        &self.entries
    }

    /// Records that `script` declares class `species` at `reg`.
    ///
    /// A species exactly one past the end grows the table (shipped data
    /// contains such an off-by-one); anything further out is fatal.
    pub(crate) fn register_species(
        &mut self,
        species: u16,
        reg: Reg,
        script: u16,
    ) -> Result<Option<DataWarning>, DataError> {
        let size = self.entries.len();
        let index = species as usize;
        let mut warning = None;

        if index == size {
            self.entries.push(ClassEntry {
                script: Some(script),
                reg: Reg::NULL,
            });
            warning = Some(DataWarning::ClassTableGrown { species });
        } else if index > size {
            return Err(DataError::InvalidSpecies {
                species,
                size,
                script,
            });
        }

        self.entries[index].reg = reg;
        Ok(warning)
    }

    /// Forgets every address that points into `segment`. Script numbers stay.
    pub(crate) fn clear_segment(&mut self, segment: SegmentId) {
        for entry in self.entries.iter_mut() {
            if entry.reg.segment == segment {
                entry.reg = Reg::NULL;
            }
        }
    }

    /// Class ids currently resolved inside `segment`.
    pub fn classes_in(&self, segment: SegmentId) -> impl Iterator<Item = u16> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(move |(_, e)| !e.reg.is_null() && e.reg.segment == segment)
            .map(|(i, _)| i as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vocab(scripts: &[u16]) -> Vec<u8> {
        scripts
            .iter()
            .flat_map(|s| {
                let mut pair = [0u8; 4];
                LittleEndian::write_u16(&mut pair[2..], *s);
                pair
            })
            .collect()
    }

    #[test]
    fn vocabulary_pairs_map_to_scripts() {
        let mut data = vocab(&[0, 255, 12]);
        data.push(0xaa); // trailing garbage is ignored
        let table = ClassTable::from_vocabulary(&data).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(
            table.entry(1),
            Some(&ClassEntry {
                script: Some(255),
                reg: Reg::NULL
            })
        );
    }

    #[test]
    fn empty_vocabulary_is_fatal() {
        assert!(matches!(
            ClassTable::from_vocabulary(&[1, 2]),
            Err(DataError::MissingVocabulary(_))
        ));
    }

    #[test]
    fn one_past_the_end_grows_the_table() {
        let mut table = ClassTable::from_vocabulary(&vocab(&[0, 0])).unwrap();
        let at = Reg::new(SegmentId(2), 8);
        let warning = table.register_species(2, at, 7).unwrap();
        assert_eq!(warning, Some(DataWarning::ClassTableGrown { species: 2 }));
        assert_eq!(table.len(), 3);
        assert_eq!(table.entry(2).unwrap().reg, at);
        assert_eq!(table.entry(2).unwrap().script, Some(7));
    }

    #[test]
    fn further_overrun_is_fatal() {
        let mut table = ClassTable::from_vocabulary(&vocab(&[0, 0])).unwrap();
        let err = table
            .register_species(3, Reg::new(SegmentId(2), 8), 7)
            .unwrap_err();
        assert!(matches!(
            err,
            DataError::InvalidSpecies {
                species: 3,
                size: 2,
                script: 7
            }
        ));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn clearing_a_segment_keeps_script_numbers() {
        let mut table = ClassTable::from_vocabulary(&vocab(&[4, 4, 5])).unwrap();
        table.register_species(0, Reg::new(SegmentId(1), 8), 4).unwrap();
        table.register_species(1, Reg::new(SegmentId(1), 30), 4).unwrap();
        table.register_species(2, Reg::new(SegmentId(2), 8), 5).unwrap();
        assert_eq!(table.classes_in(SegmentId(1)).collect::<Vec<_>>(), vec![0, 1]);

        table.clear_segment(SegmentId(1));
        assert!(table.entry(0).unwrap().reg.is_null());
        assert_eq!(table.entry(0).unwrap().script, Some(4));
        assert_eq!(table.entry(2).unwrap().reg, Reg::new(SegmentId(2), 8));
    }
}
