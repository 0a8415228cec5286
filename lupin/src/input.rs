use crate::common::*;
use crate::design::GroupAssignment;
use crate::error::LupinError;

use matrix_util::traits::NamedIoOps;

/// Named assays sharing one feature space, plus the design used when
/// a run does not bring its own
#[derive(Debug, Clone, Default)]
pub struct AssayBundle {
    assays: Vec<(Box<str>, NamedMat)>,
    design: Option<NamedMat>,
}

impl AssayBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an assay under a new name
    pub fn add_assay(&mut self, name: &str, assay: NamedMat) -> anyhow::Result<()> {
        if self.assay(name).is_some() {
            return Err(LupinError::identifier_conflict(format!(
                "assay `{}` already exists",
                name
            )));
        }
        self.assays.push((name.into(), assay));
        Ok(())
    }

    /// Read a features x columns table (header line of column names,
    /// first column feature names) and add it as an assay
    pub fn read_assay(&mut self, name: &str, file: &str) -> anyhow::Result<()> {
        let assay = Mat::read_named(file)?;
        info!(
            "assay `{}`: {} x {} from {}",
            name,
            assay.nrows(),
            assay.ncols(),
            file
        );
        self.add_assay(name, assay)
    }

    pub fn with_design(mut self, design: NamedMat) -> Self {
        self.design = Some(design);
        self
    }

    pub fn set_design(&mut self, design: NamedMat) {
        self.design = Some(design);
    }

    pub fn assay(&self, name: &str) -> Option<&NamedMat> {
        self.assays
            .iter()
            .find(|(n, _)| n.as_ref() == name)
            .map(|(_, a)| a)
    }

    pub fn assay_names(&self) -> Vec<&str> {
        self.assays.iter().map(|(n, _)| n.as_ref()).collect()
    }

    pub fn design(&self) -> Option<&NamedMat> {
        self.design.as_ref()
    }
}

/// Everything one pass over the signature x sample grid reads
pub struct GridInputs<'a> {
    /// (name, features x predictors) in run order
    pub signatures: Vec<(&'a str, &'a NamedMat)>,
    /// features x samples
    pub expression: &'a NamedMat,
    /// features x samples, same features as `expression`
    pub offset: &'a NamedMat,
    pub assignment: &'a GroupAssignment,
    pub standardize: bool,
}

impl GridInputs<'_> {
    pub fn signature_names(&self) -> Vec<Box<str>> {
        self.signatures.iter().map(|&(s, _)| s.into()).collect()
    }

    pub fn num_pairs(&self) -> usize {
        self.signatures.len() * self.assignment.len()
    }

    /// Expression and offset columns of the `j`-th assigned sample
    pub fn response(&self, j: usize) -> anyhow::Result<(DVec, DVec)> {
        let sample = &self.assignment.samples()[j];
        let y = self.expression.column_by_name(sample).ok_or_else(|| {
            LupinError::type_mismatch(format!("no expression column for sample `{}`", sample))
        })?;
        let offset = self.offset.column_by_name(sample).ok_or_else(|| {
            LupinError::type_mismatch(format!("no offset column for sample `{}`", sample))
        })?;
        Ok((y, offset))
    }
}
