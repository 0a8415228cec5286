#![allow(dead_code)]

pub use log::{info, warn};

pub use matrix_util::traits::{MatOps, MatWithNames};

pub type Mat = nalgebra::DMatrix<f64>;
pub type DVec = nalgebra::DVector<f64>;
pub type NamedMat = MatWithNames<Mat>;

pub use fnv::FnvHashMap as HashMap;
