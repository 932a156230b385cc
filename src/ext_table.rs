// Fixed-capacity table of extension blocks, split into static and dynamic
// groups.

use crate::error::{BlockKind, RpuError};
use crate::metadata::DmData;

pub const MAX_STATIC_BLOCKS: usize = 7;
pub const MAX_DYNAMIC_BLOCKS: usize = 25;

const EMPTY: DmData = DmData::Unknown(0);

#[derive(Debug, Clone, Copy)]
pub struct ExtBlockTable {
    static_blocks: [DmData; MAX_STATIC_BLOCKS],
    num_static: usize,
    dynamic_blocks: [DmData; MAX_DYNAMIC_BLOCKS],
    num_dynamic: usize,
}

impl Default for ExtBlockTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtBlockTable {
    pub const fn new() -> Self {
        Self {
            static_blocks: [EMPTY; MAX_STATIC_BLOCKS],
            num_static: 0,
            dynamic_blocks: [EMPTY; MAX_DYNAMIC_BLOCKS],
            num_dynamic: 0,
        }
    }

    /// Append a block to the group selected by its level.
    pub fn push(&mut self, block: DmData) -> Result<(), RpuError> {
        if block.is_static() {
            self.push_static(block)
        } else {
            self.push_dynamic(block)
        }
    }

    fn push_static(&mut self, block: DmData) -> Result<(), RpuError> {
        if self.num_static == MAX_STATIC_BLOCKS {
            return Err(RpuError::CapacityExceeded {
                kind: BlockKind::Static,
                max: MAX_STATIC_BLOCKS,
            });
        }
        self.static_blocks[self.num_static] = block;
        self.num_static += 1;
        Ok(())
    }

    fn push_dynamic(&mut self, block: DmData) -> Result<(), RpuError> {
        if self.num_dynamic == MAX_DYNAMIC_BLOCKS {
            return Err(RpuError::CapacityExceeded {
                kind: BlockKind::Dynamic,
                max: MAX_DYNAMIC_BLOCKS,
            });
        }
        self.dynamic_blocks[self.num_dynamic] = block;
        self.num_dynamic += 1;
        Ok(())
    }

    pub fn static_blocks(&self) -> &[DmData] {
        &self.static_blocks[..self.num_static]
    }

    pub fn dynamic_blocks(&self) -> &[DmData] {
        &self.dynamic_blocks[..self.num_dynamic]
    }

    /// Static blocks first, then dynamic blocks.
    pub fn iter(&self) -> impl Iterator<Item = &DmData> {
        self.static_blocks().iter().chain(self.dynamic_blocks())
    }

    /// First block with the given level.
    pub fn get(&self, level: u8) -> Option<&DmData> {
        self.iter().find(|b| b.level() == level)
    }

    pub fn len(&self) -> usize {
        self.num_static + self.num_dynamic
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PartialEq for ExtBlockTable {
    fn eq(&self, other: &Self) -> bool {
        self.static_blocks() == other.static_blocks()
            && self.dynamic_blocks() == other.dynamic_blocks()
    }
}

impl Eq for ExtBlockTable {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Level1, Level6};

    fn l1(avg: u16) -> DmData {
        DmData::Level1(Level1 {
            min_pq: 0,
            max_pq: 4095,
            avg_pq: avg,
        })
    }

    #[test]
    fn sorts_by_level() {
        let mut t = ExtBlockTable::new();
        t.push(l1(10)).unwrap();
        t.push(DmData::Level6(Level6::default())).unwrap();
        t.push(DmData::Unknown(32)).unwrap();
        assert_eq!(t.static_blocks().len(), 2);
        assert_eq!(t.dynamic_blocks(), &[l1(10)]);
        let levels: Vec<u8> = t.iter().map(DmData::level).collect();
        assert_eq!(levels, vec![6, 32, 1]);
        assert_eq!(t.get(1), Some(&l1(10)));
    }

    #[test]
    fn static_capacity() {
        let mut t = ExtBlockTable::new();
        for _ in 0..MAX_STATIC_BLOCKS {
            t.push(DmData::Level6(Level6::default())).unwrap();
        }
        let err = t.push(DmData::Level6(Level6::default())).unwrap_err();
        assert!(matches!(
            err,
            RpuError::CapacityExceeded {
                kind: BlockKind::Static,
                max: 7
            }
        ));
        assert_eq!(t.len(), 7);
    }

    #[test]
    fn dynamic_capacity() {
        let mut t = ExtBlockTable::new();
        for i in 0..MAX_DYNAMIC_BLOCKS {
            t.push(l1(i as u16)).unwrap();
        }
        assert!(matches!(
            t.push(l1(0)),
            Err(RpuError::CapacityExceeded {
                kind: BlockKind::Dynamic,
                max: 25
            })
        ));
    }

    #[test]
    fn equality_compares_used_slots() {
        let mut a = ExtBlockTable::new();
        let mut b = ExtBlockTable::new();
        assert_eq!(a, b);
        a.push(l1(3)).unwrap();
        assert_ne!(a, b);
        b.push(l1(3)).unwrap();
        assert_eq!(a, b);
        a.push(DmData::Level6(Level6::default())).unwrap();
        b.push(l1(4)).unwrap();
        assert_ne!(a, b);
    }
}
