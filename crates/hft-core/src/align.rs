/// Wrapper type that forces 128-byte alignment to keep hot atomics off a
/// shared cache line with their neighbors (prefetcher-induced false sharing
/// on Intel/AMD CPUs can pull in adjacent 64-byte lines, so we pad to two).
#[repr(align(128))]
pub(crate) struct CacheAligned<T> {
    value: T,
}

impl<T> CacheAligned<T> {
    pub(crate) const fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T> std::ops::Deref for CacheAligned<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}
