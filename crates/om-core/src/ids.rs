use core::fmt;
use core::num::NonZeroU32;

/// Compact, stable identifier for an element position in a beamline.
///
/// - `u32` keeps memory small
/// - `NonZero` enables `Option<ElementId>` to be pointer-optimized
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(NonZeroU32);

impl ElementId {
    /// Largest index that has an id.
    pub const MAX_INDEX: usize = (u32::MAX - 1) as usize;

    /// Create an id from a 0-based index by storing index+1.
    ///
    /// Returns `None` past [`ElementId::MAX_INDEX`].
    pub fn from_index(index: usize) -> Option<Self> {
        u32::try_from(index)
            .ok()
            .and_then(|i| i.checked_add(1))
            .and_then(NonZeroU32::new)
            .map(Self)
    }

    /// Recover the 0-based index.
    pub fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

impl fmt::Debug for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementId({})", self.index())
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}
