//! Static model descriptors
//!
//! Each logical index corresponds to one embedding model. The descriptor
//! carries everything the vector store adapter and the command layer need:
//! vector dimension, distance metric, index and search parameters, and the
//! cardinality (number of descriptors per image).

/// Maximum length of a url primary key (RFC-adjacent browser limit).
pub const MAX_URL_LENGTH: usize = 2083;

/// Maximum byte length of a JSON-serialised metadata string.
pub const MAX_METADATA_LENGTH: usize = 65535;

/// Maximum number of items a single paginated query may return.
pub const MAX_PAGINATION: usize = 16384;

/// Distance metric of a collection.
///
/// Cosine similarity is handled as L2 over normalised vectors, so only L2
/// exists as a storage-level metric today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Squared euclidean distance.
    L2,
    /// Inner product. Supported by the store, but `compare` has no distance
    /// implementation for it.
    Ip,
}

impl Metric {
    /// The metric name understood by the vector store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::L2 => "L2",
            Self::Ip => "IP",
        }
    }
}

/// The ANN index built over a collection's embedding field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorIndex {
    /// Inverted-file index with flat (exact) residuals.
    IvfFlat {
        /// Number of cluster units.
        nlist: u32,
    },
    /// Hierarchical navigable small world graph.
    Hnsw {
        /// Maximum degree of graph nodes.
        m: u32,
        /// Search breadth during index construction.
        ef_construction: u32,
    },
}

impl VectorIndex {
    /// The index name understood by the vector store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IvfFlat { .. } => "IVF_FLAT",
            Self::Hnsw { .. } => "HNSW",
        }
    }
}

/// ANN search parameters, matched to the collection's index kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchParams {
    /// Number of cluster units to probe (IVF indexes).
    Nprobe(u32),
    /// Search breadth (HNSW indexes).
    Ef(u32),
}

/// Static description of one embedding model and its collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    /// Model name; doubles as the collection name.
    pub name: &'static str,
    /// Embedding dimension.
    pub dimension: usize,
    /// Distance metric of the collection.
    pub metric: Metric,
    /// Index built over the embedding field.
    pub index: VectorIndex,
    /// Search parameters used for every ANN query.
    pub search_params: SearchParams,
    /// Maximum number of descriptors per image. 1 means one global
    /// descriptor; greater than 1 means up to that many local descriptors
    /// stored under composite `url#pos` keys.
    pub cardinality: usize,
    /// Whether the model can embed text queries.
    pub supports_text: bool,
}

impl ModelDescriptor {
    /// Returns true when this model stores several local descriptors per
    /// image under composite keys.
    #[must_use]
    pub const fn is_local_feature(&self) -> bool {
        self.cardinality > 1
    }
}

/// The static table of supported models.
///
/// Collections are created from this table at worker startup; the schema,
/// index, and metric of a collection are immutable afterwards.
const MODELS: &[ModelDescriptor] = &[
        ModelDescriptor {
            name: "vit_b32",
            dimension: 512,
            metric: Metric::L2,
            index: VectorIndex::IvfFlat { nlist: 2048 },
            search_params: SearchParams::Nprobe(10),
            cardinality: 1,
            supports_text: true,
        },
        ModelDescriptor {
            name: "resnet50",
            dimension: 2048,
            metric: Metric::L2,
            index: VectorIndex::Hnsw {
                m: 16,
                ef_construction: 200,
            },
            search_params: SearchParams::Ef(64),
            cardinality: 1,
            supports_text: false,
        },
        ModelDescriptor {
            name: "sift100",
            dimension: 128,
            metric: Metric::L2,
            index: VectorIndex::IvfFlat { nlist: 2048 },
            search_params: SearchParams::Nprobe(10),
            cardinality: 100,
            supports_text: false,
        },
];

/// The supported models.
#[must_use]
pub const fn model_registry() -> &'static [ModelDescriptor] {
    MODELS
}

/// Looks up a model descriptor by name.
#[must_use]
pub fn find_model(name: &str) -> Option<&'static ModelDescriptor> {
    model_registry().iter().find(|m| m.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_names_are_unique() {
        let mut names: Vec<_> = model_registry().iter().map(|m| m.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), model_registry().len());
    }

    #[test]
    fn test_vit_b32_is_global() {
        let model = find_model("vit_b32").expect("vit_b32 registered");
        assert!(!model.is_local_feature());
        assert_eq!(model.dimension, 512);
        assert!(model.supports_text);
    }

    #[test]
    fn test_sift100_is_local_feature() {
        let model = find_model("sift100").expect("sift100 registered");
        assert!(model.is_local_feature());
        assert_eq!(model.cardinality, 100);
        assert!(!model.supports_text);
    }

    #[test]
    fn test_unknown_model_is_none() {
        assert!(find_model("vit_l14").is_none());
    }

    #[test]
    fn test_index_names() {
        assert_eq!(VectorIndex::IvfFlat { nlist: 2048 }.as_str(), "IVF_FLAT");
        assert_eq!(
            VectorIndex::Hnsw {
                m: 16,
                ef_construction: 200
            }
            .as_str(),
            "HNSW"
        );
    }
}
