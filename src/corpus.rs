//! Sparse corpus storage.
//!
//! A corpus is a row-major CSR matrix: one row per text snippet, one column
//! per vocabulary term, with a 1 (or a small weight) wherever the term occurs
//! in the snippet. Rows are immutable after loading; the only mutation is the
//! idempotent squared-norm annotation used by the distance computations.

use crate::error::{Result, SmapError};
use crate::io;
use crate::{SnippetIndex, TermIndex, Weight};
use log::info;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Corpus file format version with per-entry weights.
const FORMAT_WEIGHTED: u8 = 2;
/// Corpus file format version without weights.
const FORMAT_UNWEIGHTED: u8 = 3;

/// A binary (optionally weighted) sparse term-occurrence matrix.
#[derive(Debug)]
pub struct SparseCorpus {
    num_rows: SnippetIndex,
    num_cols: TermIndex,
    num_non_zero: SnippetIndex,
    /// Concatenated per-row ascending vocabulary indices.
    indices: Vec<TermIndex>,
    /// `num_rows + 1` offsets into `indices`.
    index_pointers: Vec<SnippetIndex>,
    /// One weight per non-zero entry; empty for unweighted corpora.
    weights: Vec<Weight>,
    has_weights: bool,
    /// Per-row sum of squared weights (or the non-zero count when unweighted).
    sum_of_squares: Option<Vec<u32>>,
}

impl SparseCorpus {
    /// Builds a corpus from raw CSR parts.
    ///
    /// `weights` must be empty or as long as `indices`. Row contents must be
    /// strictly ascending and below `num_cols`.
    pub fn from_parts(
        num_cols: TermIndex,
        indices: Vec<TermIndex>,
        index_pointers: Vec<SnippetIndex>,
        weights: Vec<Weight>,
    ) -> Result<Self> {
        if index_pointers.is_empty() {
            return Err(SmapError::Validation(
                "index pointers must contain at least the leading zero".to_string(),
            ));
        }
        if !weights.is_empty() && weights.len() != indices.len() {
            return Err(SmapError::Validation(
                "weights must be empty or match the number of non-zero entries".to_string(),
            ));
        }
        let num_rows = (index_pointers.len() - 1) as SnippetIndex;
        let num_non_zero = indices.len() as SnippetIndex;
        let has_weights = !weights.is_empty();
        let corpus = Self {
            num_rows,
            num_cols,
            num_non_zero,
            indices,
            index_pointers,
            weights,
            has_weights,
            sum_of_squares: None,
        };
        corpus.check_invariants()?;
        Ok(corpus)
    }

    /// Loads a corpus from its framed binary file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("loading corpus data from {}", path.as_ref().display());
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let format_version = io::read_u8(&mut reader)?;
        let has_weights = match format_version {
            FORMAT_WEIGHTED => true,
            FORMAT_UNWEIGHTED => false,
            other => {
                return Err(SmapError::Format(format!(
                    "expected corpus format version 2 or 3, got {}",
                    other
                )))
            }
        };

        let num_non_zero = io::read_u64(&mut reader)?;
        if num_non_zero > SnippetIndex::MAX as u64 {
            return Err(SmapError::Format(format!(
                "too many entries in training data: {}",
                num_non_zero
            )));
        }
        let num_non_zero = num_non_zero as SnippetIndex;

        let num_rows = io::read_u32(&mut reader)?;
        let num_cols = io::read_u32(&mut reader)?;

        let mut indices = Vec::new();
        indices.try_reserve_exact(num_non_zero as usize).map_err(|_| {
            SmapError::ResourceExhausted(format!(
                "failed to allocate {} corpus entries",
                num_non_zero
            ))
        })?;
        let mut weights = Vec::new();
        if has_weights {
            weights.try_reserve_exact(num_non_zero as usize).map_err(|_| {
                SmapError::ResourceExhausted(format!(
                    "failed to allocate {} corpus weights",
                    num_non_zero
                ))
            })?;
        }
        let mut index_pointers = Vec::with_capacity(num_rows as usize + 1);
        index_pointers.push(0);

        for _ in 0..num_rows {
            let entries_in_row = io::read_u32(&mut reader)?;
            let row_indices = io::read_u32_vec(&mut reader, entries_in_row as usize)?;
            indices.extend_from_slice(&row_indices);
            index_pointers.push(indices.len() as SnippetIndex);

            if has_weights {
                let mut row_weights = vec![0u8; entries_in_row as usize];
                std::io::Read::read_exact(&mut reader, &mut row_weights)?;
                weights.extend_from_slice(&row_weights);
            }
        }

        if indices.len() as SnippetIndex != num_non_zero {
            return Err(SmapError::Format(format!(
                "corpus declares {} entries but its rows contain {}",
                num_non_zero,
                indices.len()
            )));
        }

        let corpus = Self {
            num_rows,
            num_cols,
            num_non_zero,
            indices,
            index_pointers,
            weights,
            has_weights,
            sum_of_squares: None,
        };
        corpus.check_invariants()?;
        info!(
            "loaded {} snippets over {} terms ({} non-zeros)",
            corpus.num_rows, corpus.num_cols, corpus.num_non_zero
        );
        Ok(corpus)
    }

    /// Saves the corpus in the framed binary layout read by [`Self::load`].
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        info!("saving corpus to {}", path.as_ref().display());
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let format_version = if self.has_weights {
            FORMAT_WEIGHTED
        } else {
            FORMAT_UNWEIGHTED
        };
        io::write_u8(&mut writer, format_version)?;
        io::write_u64(&mut writer, self.num_non_zero as u64)?;
        io::write_u32(&mut writer, self.num_rows)?;
        io::write_u32(&mut writer, self.num_cols)?;

        for row in 0..self.num_rows as usize {
            let row_indices = self.indices_in_row(row);
            io::write_u32(&mut writer, row_indices.len() as u32)?;
            io::write_u32_slice(&mut writer, row_indices)?;
            if self.has_weights {
                writer.write_all(self.weights_in_row(row))?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    fn check_invariants(&self) -> Result<()> {
        let pointers = &self.index_pointers;
        if pointers[0] != 0 || *pointers.last().unwrap_or(&0) != self.num_non_zero {
            return Err(SmapError::Format(
                "corpus index pointers do not span the entry array".to_string(),
            ));
        }
        for row in 0..self.num_rows as usize {
            if pointers[row + 1] < pointers[row] {
                return Err(SmapError::Format(format!(
                    "corpus index pointers decrease at row {}",
                    row
                )));
            }
            let row_indices = self.indices_in_row(row);
            for pair in row_indices.windows(2) {
                if pair[1] <= pair[0] {
                    return Err(SmapError::Format(format!(
                        "corpus indices not strictly ascending in row {}",
                        row
                    )));
                }
            }
            if let Some(&last) = row_indices.last() {
                if last >= self.num_cols {
                    return Err(SmapError::Format(format!(
                        "corpus index {} exceeds vocabulary size {} in row {}",
                        last, self.num_cols, row
                    )));
                }
            }
        }
        Ok(())
    }

    /// Number of snippets.
    #[inline]
    pub fn num_rows(&self) -> SnippetIndex {
        self.num_rows
    }

    /// Vocabulary size.
    #[inline]
    pub fn num_cols(&self) -> TermIndex {
        self.num_cols
    }

    /// Total number of non-zero entries.
    #[inline]
    pub fn num_non_zero(&self) -> SnippetIndex {
        self.num_non_zero
    }

    /// Whether the corpus carries per-entry weights.
    #[inline]
    pub fn has_weights(&self) -> bool {
        self.has_weights
    }

    /// The ascending vocabulary indices of one row.
    #[inline]
    pub fn indices_in_row(&self, row: usize) -> &[TermIndex] {
        let start = self.index_pointers[row] as usize;
        let end = self.index_pointers[row + 1] as usize;
        &self.indices[start..end]
    }

    /// The per-entry weights of one row (empty for unweighted corpora).
    #[inline]
    pub fn weights_in_row(&self, row: usize) -> &[Weight] {
        if !self.has_weights {
            return &[];
        }
        let start = self.index_pointers[row] as usize;
        let end = self.index_pointers[row + 1] as usize;
        &self.weights[start..end]
    }

    /// Number of non-zero entries in one row.
    #[inline]
    pub fn num_indices_in_row(&self, row: usize) -> TermIndex {
        (self.index_pointers[row + 1] - self.index_pointers[row]) as TermIndex
    }

    /// The smallest vocabulary cutoff that keeps every row non-empty.
    ///
    /// Equals the maximum over rows of the smallest term index in the row;
    /// empty rows are skipped.
    pub fn min_word_index_to_avoid_empty_row(&self) -> TermIndex {
        let mut max_first_word_index = 0;
        for row in 0..self.num_rows as usize {
            if let Some(&first) = self.indices_in_row(row).first() {
                if first > max_first_word_index {
                    max_first_word_index = first;
                }
            }
        }
        max_first_word_index
    }

    /// Fills the per-row squared-norm cache. Idempotent.
    pub fn init_sum_of_squares(&mut self) {
        if self.sum_of_squares.is_some() {
            return;
        }
        let mut sums = Vec::with_capacity(self.num_rows as usize);
        for row in 0..self.num_rows as usize {
            let sum = if self.has_weights {
                self.weights_in_row(row)
                    .iter()
                    .map(|&w| w as u32 * w as u32)
                    .sum()
            } else {
                self.num_indices_in_row(row)
            };
            sums.push(sum);
        }
        self.sum_of_squares = Some(sums);
    }

    /// The per-row squared norms, if [`Self::init_sum_of_squares`] ran.
    #[inline]
    pub fn sum_of_squares(&self) -> Option<&[u32]> {
        self.sum_of_squares.as_deref()
    }
}
