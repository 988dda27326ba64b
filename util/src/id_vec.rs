use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// A `Vec` addressed by a typed id (see [`id!`](crate::id)),
/// so that ids of one table can't be used to index another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdVec<K, V> {
    items: Vec<V>,
    key: PhantomData<fn(K) -> K>,
}

impl<K, V> From<Vec<V>> for IdVec<K, V> {
    fn from(items: Vec<V>) -> Self {
        Self {
            items,
            key: PhantomData,
        }
    }
}

impl<K, V> Default for IdVec<K, V> {
    fn default() -> Self {
        Vec::new().into()
    }
}

impl<K, V> IdVec<K, V> {
    pub fn with_capacity(cap: usize) -> Self {
        Vec::with_capacity(cap).into()
    }

    /// `len` copies of `val`, e.g. a state per node of a graph.
    pub fn fill(val: V, len: usize) -> Self
    where
        V: Clone,
    {
        vec![val; len].into()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, V> {
        self.items.iter()
    }
}

impl<K: From<usize> + Into<usize>, V> IdVec<K, V> {
    /// Append `v`; the returned id retrieves it.
    pub fn push(&mut self, v: V) -> K {
        self.items.push(v);
        K::from(self.items.len() - 1)
    }

    #[inline]
    pub fn get(&self, k: K) -> &V {
        &self.items[k.into()]
    }

    #[inline]
    pub fn get_mut(&mut self, k: K) -> &mut V {
        &mut self.items[k.into()]
    }

    pub fn ids(&self) -> impl Iterator<Item = K> {
        (0..self.items.len()).map(K::from)
    }

    pub fn enumerate(&self) -> impl Iterator<Item = (K, &V)> {
        self.items.iter().enumerate().map(|(i, v)| (K::from(i), v))
    }

    /// Consume the table, yielding every value with its id.
    pub fn into_enumerate(self) -> impl Iterator<Item = (K, V)> {
        self.items.into_iter().enumerate().map(|(i, v)| (K::from(i), v))
    }
}

impl<K: Into<usize>, V> Index<K> for IdVec<K, V> {
    type Output = V;

    fn index(&self, k: K) -> &V {
        &self.items[k.into()]
    }
}

impl<K: Into<usize>, V> IndexMut<K> for IdVec<K, V> {
    fn index_mut(&mut self, k: K) -> &mut V {
        &mut self.items[k.into()]
    }
}
