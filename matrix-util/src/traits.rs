use crate::common_io::Delimiter;

/// A matrix carrying its row and column names
#[derive(Debug, Clone, PartialEq)]
pub struct MatWithNames<T> {
    pub rows: Vec<Box<str>>,
    pub cols: Vec<Box<str>>,
    pub mat: T,
}

/// Centre or standardize columns
pub trait MatOps {
    type Mat;
    type Scalar;

    fn centre_columns_inplace(&mut self);
    fn centre_columns(&self) -> Self::Mat;

    /// `(x - mean) / sd` with the sample standard deviation
    /// (`n - 1`). Columns with zero deviation are only centred.
    fn scale_columns_inplace(&mut self);
    fn scale_columns(&self) -> Self::Mat;

    /// Sample variance (`n - 1`) of each column
    fn column_variances(&self) -> Vec<Self::Scalar>;
}

/// Read and write matrices from and to delimited files
pub trait IoOps {
    type Scalar;
    type Mat;

    fn read_file_delim(
        file: &str,
        delim: impl Into<Delimiter>,
        skip: Option<usize>,
    ) -> anyhow::Result<Self::Mat>;

    fn from_tsv(tsv_file: &str, skip: Option<usize>) -> anyhow::Result<Self::Mat> {
        Self::read_file_delim(tsv_file, "\t", skip)
    }

    fn write_file_delim(&self, file: &str, delim: &str) -> anyhow::Result<()>;

    fn to_tsv(&self, tsv_file: &str) -> anyhow::Result<()> {
        self.write_file_delim(tsv_file, "\t")
    }
}

/// Read matrices with a header line of column names and a leading
/// column of row names
pub trait NamedIoOps {
    type Mat;

    fn read_named_delim(
        file: &str,
        delim: impl Into<Delimiter>,
    ) -> anyhow::Result<MatWithNames<Self::Mat>>;

    fn read_named(file: &str) -> anyhow::Result<MatWithNames<Self::Mat>> {
        Self::read_named_delim(file, crate::common_io::delimiter_of(file))
    }
}
