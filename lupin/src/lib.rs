pub mod common;
pub mod design;
pub mod error;
pub mod fit_regression;
pub mod fit_significance;
pub mod grid;
pub mod input;
pub mod pipeline;
pub mod pvalue_combine;
pub mod replicate_pool;
pub mod ridge_cv;
pub mod ridge_significance;
pub mod simulate;
