//! Scouting analytics over tabular player and team statistics: dataset
//! normalization, threshold filtering, similarity search, dimensionality
//! reduction, style clustering and composite style ratings.
//!
//! Every operation takes a [`Dataset`] by reference and returns a new one.

pub mod cluster;
pub mod criteria;
pub mod dataset;
pub mod error;
pub mod normalize;
pub mod rating;
pub mod reduce;
pub mod similarity;
pub mod standardize;

pub use cluster::{AutoKMeans, Estimator, KMeans, KSelection, cluster, cluster_with};
pub use criteria::{Comparison, Criteria, filter};
pub use dataset::{Dataset, Record};
pub use error::{Result, ScoutError};
pub use normalize::{
    RollingOptions, RollingReduction, adjust_per_90, adjust_possession, clamp_by_percentiles,
    combine, rolling, rolling_with, select_categories,
};
pub use rating::{Direction, RatingConfig, RatingGroup, ReducerSpec, estimate_style_ratings};
pub use reduce::{Pca, Reducer, ReducerRegistry, reduce, reduce_with};
pub use similarity::{Target, search_similar, search_similar_with};
pub use standardize::Imputation;
