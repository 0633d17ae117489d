//! Encoder and decoder options.

/// Default cap on user-type nesting.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Default cap on the length a sparse array may be expanded to.
pub const DEFAULT_MAX_SPARSE_LEN: usize = 1 << 20;

/// Options for one serialization or deserialization call.
///
/// ```
/// use pofr::PofConfig;
///
/// let config = PofConfig::default().references(true).max_depth(64);
/// assert!(config.tracks_references());
/// assert_eq!(config.depth_limit(), 64);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PofConfig {
    references: bool,
    raw_arrays: bool,
    max_depth: usize,
    max_sparse_len: usize,
}

impl Default for PofConfig {
    fn default() -> Self {
        Self {
            references: false,
            raw_arrays: false,
            max_depth: DEFAULT_MAX_DEPTH,
            max_sparse_len: DEFAULT_MAX_SPARSE_LEN,
        }
    }
}

impl PofConfig {
    /// Enables identity tracking: a user-type value reachable more than once
    /// is written once and referenced afterwards.
    pub fn references(mut self, enabled: bool) -> Self {
        self.references = enabled;
        self
    }

    /// Writes numeric arrays as raw big-endian octet arrays.
    pub fn raw_arrays(mut self, enabled: bool) -> Self {
        self.raw_arrays = enabled;
        self
    }

    /// Sets the maximum user-type nesting depth.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Sets the longest sparse array a reader will expand into a dense one.
    /// Sparse arrays only declare an upper bound, so a few bytes can
    /// otherwise ask for an arbitrarily large buffer.
    pub fn max_sparse_len(mut self, len: usize) -> Self {
        self.max_sparse_len = len;
        self
    }

    pub fn tracks_references(&self) -> bool {
        self.references
    }

    pub fn uses_raw_arrays(&self) -> bool {
        self.raw_arrays
    }

    pub fn depth_limit(&self) -> usize {
        self.max_depth
    }

    pub fn sparse_len_limit(&self) -> usize {
        self.max_sparse_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PofConfig::default();
        assert!(!config.tracks_references());
        assert!(!config.uses_raw_arrays());
        assert_eq!(config.depth_limit(), DEFAULT_MAX_DEPTH);
        assert_eq!(config.sparse_len_limit(), DEFAULT_MAX_SPARSE_LEN);
    }

    #[test]
    fn chained() {
        let config = PofConfig::default()
            .raw_arrays(true)
            .references(true)
            .max_sparse_len(16);
        assert!(config.uses_raw_arrays());
        assert!(config.tracks_references());
        assert_eq!(config.sparse_len_limit(), 16);
    }
}
