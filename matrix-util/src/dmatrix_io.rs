use crate::common_io::{read_lines_of_words_delim, write_lines, Delimiter, ReadLinesOut};
use crate::traits::*;
pub use nalgebra::{DMatrix, DVector};

use std::fmt::{Debug, Display};
use std::str::FromStr;

fn parse_words<T>(words: &[Box<str>], line_no: usize) -> anyhow::Result<Vec<T>>
where
    T: FromStr,
    <T as FromStr>::Err: Debug,
{
    words
        .iter()
        .map(|w| {
            w.trim()
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("line {}: can't parse `{}`: {:?}", line_no, w, e))
        })
        .collect()
}

impl<T> IoOps for DMatrix<T>
where
    T: nalgebra::Scalar + FromStr + Display + Copy,
    <T as FromStr>::Err: Debug,
{
    type Scalar = T;
    type Mat = Self;

    fn read_file_delim(
        file: &str,
        delim: impl Into<Delimiter>,
        skip: Option<usize>,
    ) -> anyhow::Result<Self::Mat> {
        let hdr_line = match skip {
            Some(skip) => skip as i64,
            None => -1, // no skipping
        };

        let ReadLinesOut { lines, .. } = read_lines_of_words_delim(file, delim, hdr_line)?;

        if lines.is_empty() {
            anyhow::bail!("No data in file {}", file);
        }

        let ncols = lines[0].len();
        let nrows = lines.len();
        let mut data = Vec::with_capacity(nrows * ncols);
        for (i, words) in lines.iter().enumerate() {
            if words.len() != ncols {
                anyhow::bail!("line {} has {} fields, expected {}", i, words.len(), ncols);
            }
            data.extend(parse_words::<T>(words, i)?);
        }

        Ok(DMatrix::<T>::from_row_iterator(nrows, ncols, data))
    }

    fn write_file_delim(&self, file: &str, delim: &str) -> anyhow::Result<()> {
        let lines = self
            .row_iter()
            .map(|row| {
                row.iter()
                    .map(|x| format!("{}", *x))
                    .collect::<Vec<String>>()
                    .join(delim)
            })
            .collect::<Vec<_>>();
        write_lines(&lines, file)
    }
}

impl<T> NamedIoOps for DMatrix<T>
where
    T: nalgebra::Scalar + FromStr + Display + Copy,
    <T as FromStr>::Err: Debug,
{
    type Mat = Self;

    fn read_named_delim(
        file: &str,
        delim: impl Into<Delimiter>,
    ) -> anyhow::Result<MatWithNames<Self::Mat>> {
        let ReadLinesOut { lines, header } = read_lines_of_words_delim(file, delim, 0)?;

        if lines.is_empty() {
            anyhow::bail!("No data in file {}", file);
        }

        let nfields = lines[0].len();
        if nfields < 2 {
            anyhow::bail!("{}: need a row name column and at least one data column", file);
        }
        let ncols = nfields - 1;

        // The header may or may not name the row-name column
        let cols: Vec<Box<str>> = if header.len() == nfields {
            header[1..].to_vec()
        } else if header.len() == ncols {
            header
        } else {
            anyhow::bail!(
                "{}: header has {} names, but rows have {} values",
                file,
                header.len(),
                ncols
            );
        };

        let nrows = lines.len();
        let mut rows = Vec::with_capacity(nrows);
        let mut data = Vec::with_capacity(nrows * ncols);
        for (i, words) in lines.iter().enumerate() {
            if words.len() != nfields {
                anyhow::bail!("{}: line {} has {} fields, expected {}", file, i + 1, words.len(), nfields);
            }
            rows.push(words[0].clone());
            data.extend(parse_words::<T>(&words[1..], i + 1)?);
        }

        MatWithNames::new(rows, cols, DMatrix::<T>::from_row_iterator(nrows, ncols, data))
    }
}

impl<T> MatWithNames<DMatrix<T>>
where
    T: nalgebra::Scalar + FromStr + Display + Copy,
    <T as FromStr>::Err: Debug,
{
    /// Write with a header line `corner, cols...` and one line per row
    pub fn write_named_delim(&self, file: &str, delim: &str, corner: &str) -> anyhow::Result<()> {
        let mut lines = Vec::with_capacity(self.mat.nrows() + 1);
        let mut header = vec![corner.to_string()];
        header.extend(self.cols.iter().map(|c| c.to_string()));
        lines.push(header.join(delim));

        for (name, row) in self.rows.iter().zip(self.mat.row_iter()) {
            let mut words = vec![name.to_string()];
            words.extend(row.iter().map(|x| format!("{}", *x)));
            lines.push(words.join(delim));
        }
        write_lines(&lines, file)
    }

    pub fn write_named(&self, file: &str, corner: &str) -> anyhow::Result<()> {
        self.write_named_delim(file, "\t", corner)
    }
}
