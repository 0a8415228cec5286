use crate::traits::{MatOps, MatWithNames};
pub use nalgebra::{DMatrix, DVector, RealField, Scalar};

impl<T> MatOps for DMatrix<T>
where
    T: RealField + Copy,
{
    type Mat = Self;
    type Scalar = T;

    fn centre_columns_inplace(&mut self) {
        for mut x_j in self.column_iter_mut() {
            let mu = x_j.mean();
            x_j.add_scalar_mut(-mu);
        }
    }

    fn centre_columns(&self) -> Self::Mat {
        let mut ret = self.clone();
        ret.centre_columns_inplace();
        ret
    }

    fn scale_columns_inplace(&mut self) {
        let sig: Vec<T> = self.column_variances().into_iter().map(|v| v.sqrt()).collect();
        self.centre_columns_inplace();
        for (mut x_j, &s_j) in self.column_iter_mut().zip(sig.iter()) {
            if s_j > T::zero() {
                x_j /= s_j;
            }
        }
    }

    fn scale_columns(&self) -> Self::Mat {
        let mut ret = self.clone();
        ret.scale_columns_inplace();
        ret
    }

    fn column_variances(&self) -> Vec<T> {
        let nn = self.nrows();
        if nn < 2 {
            return vec![T::zero(); self.ncols()];
        }
        let denom: T = nalgebra::convert((nn - 1) as f64);
        self.column_iter()
            .map(|x_j| {
                let mu = x_j.mean();
                x_j.iter().map(|&x| (x - mu) * (x - mu)).fold(T::zero(), |a, b| a + b) / denom
            })
            .collect()
    }
}

impl<T> MatWithNames<DMatrix<T>>
where
    T: Scalar + Copy,
{
    /// Wrap a matrix with names after checking the dimensions
    pub fn new(rows: Vec<Box<str>>, cols: Vec<Box<str>>, mat: DMatrix<T>) -> anyhow::Result<Self> {
        if rows.len() != mat.nrows() || cols.len() != mat.ncols() {
            anyhow::bail!(
                "names ({} x {}) don't match the matrix ({} x {})",
                rows.len(),
                cols.len(),
                mat.nrows(),
                mat.ncols()
            );
        }
        Ok(Self { rows, cols, mat })
    }

    pub fn nrows(&self) -> usize {
        self.mat.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.mat.ncols()
    }

    pub fn row_index(&self, name: &str) -> Option<usize> {
        self.rows.iter().position(|r| r.as_ref() == name)
    }

    pub fn col_index(&self, name: &str) -> Option<usize> {
        self.cols.iter().position(|c| c.as_ref() == name)
    }

    /// Copy out a column by its name
    pub fn column_by_name(&self, name: &str) -> Option<DVector<T>> {
        self.col_index(name).map(|j| self.mat.column(j).into_owned())
    }

    /// Take a subset of columns in the order of `names`
    pub fn select_columns(&self, names: &[Box<str>]) -> anyhow::Result<Self> {
        let idx = names
            .iter()
            .map(|n| {
                self.col_index(n)
                    .ok_or(anyhow::anyhow!("column {} not found", n))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self {
            rows: self.rows.clone(),
            cols: names.to_vec(),
            mat: self.mat.select_columns(idx.iter()),
        })
    }
}
