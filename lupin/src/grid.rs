use crate::error::LupinError;

/// Values laid out on the signature x sample grid, one cell per
/// (signature, sample) pair. Cells are stored signature-major, so the
/// samples of one signature are contiguous and keep the order of the
/// group assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct PairGrid<T> {
    signatures: Vec<Box<str>>,
    samples: Vec<Box<str>>,
    cells: Vec<T>,
}

impl<T> PairGrid<T> {
    pub fn from_cells(
        signatures: Vec<Box<str>>,
        samples: Vec<Box<str>>,
        cells: Vec<T>,
    ) -> anyhow::Result<Self> {
        if signatures.len() * samples.len() != cells.len() {
            return Err(LupinError::type_mismatch(format!(
                "{} cells can't fill a {} x {} grid",
                cells.len(),
                signatures.len(),
                samples.len()
            )));
        }
        Ok(Self {
            signatures,
            samples,
            cells,
        })
    }

    /// `(signature index, sample index)` of every cell in storage order
    pub fn pair_indices(num_signatures: usize, num_samples: usize) -> Vec<(usize, usize)> {
        (0..num_signatures)
            .flat_map(|s| (0..num_samples).map(move |j| (s, j)))
            .collect()
    }

    pub fn signatures(&self) -> &[Box<str>] {
        &self.signatures
    }

    pub fn samples(&self) -> &[Box<str>] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn signature_index(&self, signature: &str) -> Option<usize> {
        self.signatures.iter().position(|s| s.as_ref() == signature)
    }

    fn sample_index(&self, sample: &str) -> Option<usize> {
        self.samples.iter().position(|s| s.as_ref() == sample)
    }

    pub fn at(&self, s: usize, j: usize) -> &T {
        &self.cells[s * self.samples.len() + j]
    }

    pub fn get(&self, signature: &str, sample: &str) -> Option<&T> {
        let s = self.signature_index(signature)?;
        let j = self.sample_index(sample)?;
        Some(self.at(s, j))
    }

    /// All cells of one signature, in sample order
    pub fn row(&self, signature: &str) -> Option<&[T]> {
        let s = self.signature_index(signature)?;
        let nn = self.samples.len();
        Some(&self.cells[(s * nn)..((s + 1) * nn)])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &T)> {
        let nn = self.samples.len();
        self.cells.iter().enumerate().map(move |(idx, cell)| {
            (
                self.signatures[idx / nn].as_ref(),
                self.samples[idx % nn].as_ref(),
                cell,
            )
        })
    }
}
