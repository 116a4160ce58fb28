//! The (term x cell) count table derived from trained BMUs.
//!
//! After training, every snippet is assigned to its best matching cell. The
//! semantic map counts, for each vocabulary term and each cell, how many
//! assigned snippets contain the term. Counts and BMU assignments both
//! persist in framed little-endian files.

use crate::codebook::Codebook;
use crate::corpus::SparseCorpus;
use crate::error::{Result, SmapError};
use crate::io;
use crate::{CellIndex, Count, SnippetIndex, TermIndex};
use log::{error, info, warn};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Largest representable per-(cell, term) count.
pub const MAX_COUNT: Count = Count::MAX;

/// Per-term, per-cell association counts plus the underlying BMU assignment.
#[derive(Debug)]
pub struct SemanticMap {
    height: CellIndex,
    width: CellIndex,
    num_cells: usize,
    vocabulary_size: TermIndex,
    dataset_size: SnippetIndex,
    best_matching_units: Vec<CellIndex>,
    /// `None` when the count build overflowed or no counts were loaded.
    counts: Option<Vec<Count>>,
}

impl SemanticMap {
    /// Builds the map by running a BMU search over the trained codebook.
    ///
    /// The search keeps the training vocabulary cutoff even though the final
    /// batch update already switched to the full vocabulary.
    pub fn build(
        data: &SparseCorpus,
        codebook: &Codebook,
        train_vocab_cutoff: TermIndex,
    ) -> Result<Self> {
        if data.num_cols() != codebook.input_dim() {
            return Err(SmapError::Validation(format!(
                "vocabulary size {} does not match codebook dimension {}",
                data.num_cols(),
                codebook.input_dim()
            )));
        }

        info!("creating semantic map");
        let effective_input_dim = if train_vocab_cutoff > 0 {
            train_vocab_cutoff
        } else {
            data.num_cols()
        };
        let (best_matching_units, _) =
            codebook.find_best_matching_units(data, effective_input_dim, false)?;

        let mut map = Self {
            height: codebook.height(),
            width: codebook.width(),
            num_cells: codebook.num_cells(),
            vocabulary_size: data.num_cols(),
            dataset_size: data.num_rows(),
            best_matching_units,
            counts: None,
        };
        map.build_counts(data)?;
        Ok(map)
    }

    /// Builds the map from an existing BMU assignment.
    pub fn from_assignment(
        data: &SparseCorpus,
        best_matching_units: Vec<CellIndex>,
        height: CellIndex,
        width: CellIndex,
    ) -> Result<Self> {
        if best_matching_units.len() != data.num_rows() as usize {
            return Err(SmapError::Validation(format!(
                "{} assignments for {} snippets",
                best_matching_units.len(),
                data.num_rows()
            )));
        }
        let mut map = Self {
            height,
            width,
            num_cells: height as usize * width as usize,
            vocabulary_size: data.num_cols(),
            dataset_size: data.num_rows(),
            best_matching_units,
            counts: None,
        };
        map.build_counts(data)?;
        Ok(map)
    }

    /// Counts term-cell associations over the whole corpus.
    ///
    /// A count that would saturate its type width aborts the build: the
    /// partial table is discarded and the map is left without counts, which
    /// callers must tolerate.
    fn build_counts(&mut self, data: &SparseCorpus) -> Result<()> {
        let size = self.num_cells * self.vocabulary_size as usize;
        let mut counts = Vec::new();
        counts.try_reserve_exact(size).map_err(|_| {
            SmapError::ResourceExhausted(format!(
                "failed to allocate {} count entries",
                size
            ))
        })?;
        counts.resize(size, 0);

        info!("counting term/cell associations");
        if accumulate_counts(&mut counts, data, &self.best_matching_units, self.num_cells) {
            self.counts = Some(counts);
        } else {
            error!("exceeding the maximum count of {}", MAX_COUNT);
            self.counts = None;
        }
        Ok(())
    }

    /// Map height in cells.
    #[inline]
    pub fn height(&self) -> CellIndex {
        self.height
    }

    /// Map width in cells.
    #[inline]
    pub fn width(&self) -> CellIndex {
        self.width
    }

    /// Vocabulary size the counts are indexed by.
    #[inline]
    pub fn vocabulary_size(&self) -> TermIndex {
        self.vocabulary_size
    }

    /// Number of snippets behind the assignment.
    #[inline]
    pub fn dataset_size(&self) -> SnippetIndex {
        self.dataset_size
    }

    /// The per-snippet cell assignment.
    #[inline]
    pub fn best_matching_units(&self) -> &[CellIndex] {
        &self.best_matching_units
    }

    /// The full count table, vocabulary-major with stride `num_cells`.
    #[inline]
    pub fn counts(&self) -> Option<&[Count]> {
        self.counts.as_deref()
    }

    /// The snippets assigned to the cell at (`map_row`, `map_col`), ascending.
    pub fn find_snippets(&self, map_row: CellIndex, map_col: CellIndex) -> Vec<SnippetIndex> {
        let cell = map_row * self.width + map_col;
        self.best_matching_units
            .iter()
            .enumerate()
            .filter(|(_, &unit)| unit == cell)
            .map(|(snippet, _)| snippet as SnippetIndex)
            .collect()
    }

    /// Total count of the cell at (`map_row`, `map_col`) across all terms.
    pub fn cell_count(&self, map_row: CellIndex, map_col: CellIndex) -> Option<Count> {
        let counts = self.counts.as_ref()?;
        let cell = (map_row * self.width + map_col) as usize;
        let mut total: Count = 0;
        for vocab_index in 0..self.vocabulary_size as usize {
            total += counts[self.num_cells * vocab_index + cell];
        }
        Some(total)
    }

    /// The per-cell count strip of one vocabulary term.
    pub fn term_counts(&self, vocab_index: TermIndex) -> Option<&[Count]> {
        let counts = self.counts.as_ref()?;
        let start = self.num_cells * vocab_index as usize;
        Some(&counts[start..start + self.num_cells])
    }

    /// Saves the count table; fails if the count build overflowed.
    pub fn save_counts<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let counts = self.counts.as_ref().ok_or_else(|| {
            SmapError::Validation("no counts available to save".to_string())
        })?;
        info!("saving counts to {}", path.as_ref().display());
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        // The leading byte mirrors the writer's endianness; always 0 here
        // because big-endian hosts are refused at startup.
        io::write_u8(&mut writer, 0)?;
        io::write_u8(&mut writer, 0)?;
        io::write_u64(&mut writer, self.height as u64)?;
        io::write_u64(&mut writer, self.width as u64)?;
        io::write_u64(&mut writer, self.vocabulary_size as u64)?;
        io::write_u32_slice(&mut writer, counts)?;
        Ok(())
    }

    /// Saves the per-snippet BMU assignment.
    pub fn save_best_matching_units<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        info!(
            "saving best matching units to {}",
            path.as_ref().display()
        );
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        io::write_u8(&mut writer, 0)?;
        io::write_u8(&mut writer, 0)?;
        io::write_u64(&mut writer, self.height as u64)?;
        io::write_u64(&mut writer, self.width as u64)?;
        io::write_u64(&mut writer, self.vocabulary_size as u64)?;
        io::write_u64(&mut writer, self.dataset_size as u64)?;
        io::write_u16_slice(&mut writer, &self.best_matching_units)?;
        Ok(())
    }

    /// Loads a count table saved by [`Self::save_counts`].
    ///
    /// The resulting map has no BMU assignment; combine with
    /// [`Self::load`] when snippet lookups are needed.
    pub fn load_counts<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("loading count table from {}", path.as_ref().display());
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let (height, width, vocabulary_size) = read_prelude(&mut reader)?;
        let num_cells = height as usize * width as usize;
        let counts = io::read_u32_vec(&mut reader, num_cells * vocabulary_size as usize)?;

        Ok(Self {
            height,
            width,
            num_cells,
            vocabulary_size,
            dataset_size: 0,
            best_matching_units: Vec::new(),
            counts: Some(counts),
        })
    }

    /// Loads counts and the BMU assignment from their files.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(counts_path: P, bmus_path: Q) -> Result<Self> {
        let mut map = Self::load_counts(counts_path)?;

        info!(
            "loading best matching units from {}",
            bmus_path.as_ref().display()
        );
        let file = File::open(bmus_path)?;
        let mut reader = BufReader::new(file);

        let (height, width, vocabulary_size) = read_prelude(&mut reader)?;
        if height != map.height || width != map.width || vocabulary_size != map.vocabulary_size {
            return Err(SmapError::Format(
                "counts and BMU files describe different maps".to_string(),
            ));
        }
        let dataset_size = io::read_u64(&mut reader)? as SnippetIndex;
        map.best_matching_units = io::read_u16_vec(&mut reader, dataset_size as usize)?;
        map.dataset_size = dataset_size;
        Ok(map)
    }
}

/// Reads the shared `flag, format, height, width, vocabulary` file prelude.
fn read_prelude<R: std::io::Read>(reader: &mut R) -> Result<(CellIndex, CellIndex, TermIndex)> {
    let endian_flag = io::read_u8(reader)?;
    if endian_flag != 0 {
        // Legitimate writers always store 0; anything else is suspicious but
        // the payload is little-endian regardless.
        warn!("file claims a big-endian writer; reading as little-endian");
    }
    let format = io::read_u8(reader)?;
    if format != 0 {
        return Err(SmapError::Format(format!(
            "stored table has unknown format {}",
            format
        )));
    }
    let height = io::read_u64(reader)? as CellIndex;
    let width = io::read_u64(reader)? as CellIndex;
    let vocabulary_size = io::read_u64(reader)? as TermIndex;
    Ok((height, width, vocabulary_size))
}

/// Adds every (term, cell) occurrence into `counts`.
///
/// Returns `false` as soon as an increment would saturate [`MAX_COUNT`];
/// the table contents are then unspecified and must be discarded.
fn accumulate_counts(
    counts: &mut [Count],
    data: &SparseCorpus,
    best_matching_units: &[CellIndex],
    num_cells: usize,
) -> bool {
    for row in 0..data.num_rows() as usize {
        let best_matching_unit = best_matching_units[row] as usize;
        for &vocab_index in data.indices_in_row(row) {
            let slot = &mut counts[num_cells * vocab_index as usize + best_matching_unit];
            if *slot >= MAX_COUNT - 1 {
                return false;
            }
            *slot += 1;
        }
    }
    true
}
