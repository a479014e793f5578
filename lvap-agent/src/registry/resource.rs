use lvap_wire::ResourceElement;
use rustc_hash::FxHashMap;

/// Bidirectional mapping between radios and interface indexes.
#[derive(Debug, Default, Clone)]
pub struct ResourceMap {
    elements: Vec<ResourceElement>,
    index: FxHashMap<ResourceElement, usize>,
}

impl ResourceMap {
    /// Builds the map. Interface `i` is the `i`-th element; duplicates keep
    /// their first index.
    pub fn new(elements: Vec<ResourceElement>) -> Self {
        let mut index = FxHashMap::default();
        for (iface, rsrc) in elements.iter().enumerate() {
            index.entry(*rsrc).or_insert(iface);
        }
        Self { elements, index }
    }

    /// Interface number of `rsrc`.
    #[inline]
    pub fn iface(&self, rsrc: &ResourceElement) -> Option<usize> {
        self.index.get(rsrc).copied()
    }

    /// Radio behind interface `iface`.
    #[inline]
    pub fn element(&self, iface: usize) -> Option<ResourceElement> {
        self.elements.get(iface).copied()
    }

    /// Every radio, indexed by interface.
    pub fn elements(&self) -> &[ResourceElement] {
        &self.elements
    }

    /// Number of radios.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether there are no radios.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}
