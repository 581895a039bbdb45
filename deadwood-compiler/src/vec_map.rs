use std::marker::PhantomData;

// 削除可能なTiVec likeな構造
// キーの値が大きすぎず、密であることが期待される場合に有効
// 例: VecMap<NodeId, Node>
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VecMap<K, V> {
    vec: Vec<Option<V>>,
    _marker: PhantomData<fn(K) -> K>,
}

impl<K: From<usize> + Copy, V> Default for VecMap<K, V>
where
    usize: From<K>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K: From<usize> + Copy, V> VecMap<K, V>
where
    usize: From<K>,
{
    pub fn new() -> Self {
        Self {
            vec: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        let i = usize::from(key);
        if i >= self.vec.len() {
            self.vec.resize_with(i + 1, || None);
        }
        self.vec[i] = Some(value);
    }

    pub fn get(&self, key: K) -> Option<&V> {
        let i = usize::from(key);
        self.vec.get(i).and_then(|opt| opt.as_ref())
    }

    pub fn contains_key(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut V> {
        let i = usize::from(key);
        self.vec.get_mut(i).and_then(|opt| opt.as_mut())
    }

    pub fn remove(&mut self, key: K) -> Option<V> {
        let i = usize::from(key);
        if i >= self.vec.len() {
            return None;
        }
        self.vec[i].take()
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.vec
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|_| K::from(i)))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.vec.iter().filter_map(|v| v.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        self.vec
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|v| (K::from(i), v)))
    }

    // O(n)
    pub fn count(&self) -> usize {
        self.values().count()
    }

    // TiVec like API
    pub fn next_key(&self) -> K {
        K::from(self.vec.len())
    }

    pub fn push(&mut self, value: V) -> K {
        let key = self.next_key();
        self.vec.push(Some(value));
        key
    }
}

impl<K: From<usize> + Copy, V> std::ops::Index<K> for VecMap<K, V>
where
    usize: From<K>,
{
    type Output = V;

    fn index(&self, index: K) -> &Self::Output {
        self.get(index).expect("no entry found for key")
    }
}

impl<K: From<usize> + Copy, V> std::ops::IndexMut<K> for VecMap<K, V>
where
    usize: From<K>,
{
    fn index_mut(&mut self, index: K) -> &mut Self::Output {
        self.get_mut(index).expect("no entry found for key")
    }
}
