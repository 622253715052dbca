use thiserror::Error;

/// Implementation of a visual bag-of-words vocabulary, built from
/// a batch of per-image descriptor sets.
pub mod vocab;
pub use vocab::{Vocabulary, VocabularyParams, VocabularyStats};

/// Bag-of-words vectors, weighting and scoring schemes.
pub mod bow;
pub use bow::{BoW, BoWTrait, Scoring, Weighting};

/// Flat descriptor matrices and the row reshape.
pub mod desc;
pub use desc::DescriptorMatrix;

/// Descriptor extraction seam and grayscale image loading.
pub mod extract;
pub use extract::{load_gray, DescriptorExtractor};

/// Utilities for extracting keypoint descriptors using opencv.
#[cfg(feature = "opencv")]
pub mod opencv_utils;
#[cfg(feature = "opencv")]
pub use opencv_utils::OrbExtractor;

/// Resolve a `dir/pattern` argument into the list of source images.
pub mod source;
pub use source::{resolve, SourceFiles};

/// Turn source images into a batch of descriptor sets.
pub mod aggregate;
pub use aggregate::{aggregate, Aggregation, AggregationReport, DegradeReason, ImageOutcome};

/// Command line options.
pub mod config;
pub use config::{Cli, Config};

/// Supported descriptor type is 32-bit binary array.
///
/// This is the most commonly used keypoint descriptor data type.
/// It is used by ORB and BRIEF, for example.
pub type Desc = [u8; 32];

/// Width in bytes of one descriptor row.
pub const DESC_WIDTH: usize = std::mem::size_of::<Desc>();

/// Descriptors detected in a single image, one entry per keypoint.
pub type ImageDescriptors = Vec<Desc>;

/// Descriptor sets of a batch of images. `batch[i]` belongs to source file `i`.
pub type FeatureBatch = Vec<ImageDescriptors>;

/// This type represents a map from features to their corresponding nodes in the Vocabulary tree.
///
/// The direct index for `feature[i]` is `di = DirectIdx[i]` where
/// `di.len() <= l` (number of levels), and `di[j]` is the id of the node matching `feature[i]`
/// at level `j` in the Vocabulary tree.
pub type DirectIdx = Vec<vocab::NodePath>;

pub type BowResult<T> = std::result::Result<T, BowErr>;

#[derive(Error, Debug)]
pub enum BowErr {
    #[error("Io Error")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "bincode")]
    #[error("Vocabulary Serialization Error")]
    Bincode(#[from] bincode::Error),
    #[cfg(feature = "opencv")]
    #[error("Opencv Error")]
    OpenCvInternal(#[from] opencv::Error),
    #[error("Invalid source file pattern")]
    Pattern(#[from] regex::Error),
    #[error("Descriptor width mismatch: expected {expected} bytes, found {found}")]
    DescriptorWidth { expected: usize, found: usize },
    #[error("Descriptor matrix of {rows}x{cols} cannot hold {len} bytes")]
    MatrixShape { rows: usize, cols: usize, len: usize },
    #[error("No descriptors to build a vocabulary from")]
    EmptyTrainingSet,
    #[error("Invalid vocabulary parameters: {0}")]
    InvalidParams(String),
    #[error("Vocabulary read back from {0} differs from the one written")]
    RoundTripMismatch(std::path::PathBuf),
}
