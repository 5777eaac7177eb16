pub type HashSet<K> = rustc_hash::FxHashSet<K>;

pub fn set_new<K>() -> HashSet<K> {
    rustc_hash::FxHashSet::default()
}
