//! # smap - Adaptive Batch-SOM Semantic Map Trainer
//!
//! smap trains a two-dimensional Self-Organizing Map over a corpus of short
//! text snippets represented as binary (optionally weighted) sparse
//! term-occurrence vectors. The training uses a batch-SOM update with an
//! adaptive per-cell neighborhood radius driven by observed topographic
//! discontinuities, so regions of the map that have not folded smoothly yet
//! keep a wide neighborhood while converged regions sharpen.
//!
//! ## Overview
//!
//! A run produces four artifacts:
//!
//! - a dense **codebook** of cell prototype vectors,
//! - a per-snippet **BMU assignment** to its best matching cell,
//! - a per-(cell, term) count table, the **semantic map**,
//! - the per-cell **neighborhood radii** at the end of training.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use smap::{Codebook, Neighborhood, SemanticMap, SparseCorpus, TrainConfig, Trainer};
//!
//! let mut corpus = SparseCorpus::load("corpus.bin")?;
//! corpus.init_sum_of_squares();
//!
//! let config = TrainConfig::default();
//! let mut codebook = Codebook::new(
//!     config.height, config.width, corpus.num_cols(),
//!     config.global_topology, config.local_topology,
//! )?;
//! codebook.init(42, true);
//! let mut neighborhood = Neighborhood::new(
//!     config.height, config.width,
//!     config.global_topology, config.local_topology,
//!     config.update_exponent, config.initial_radius,
//! )?;
//!
//! let mut log = std::fs::File::create("convergence.tsv")?;
//! let trainer = Trainer::new(&config);
//! trainer.train(&mut codebook, &mut neighborhood, &corpus, &mut log, |_, _| {})?;
//!
//! let map = SemanticMap::build(&corpus, &codebook, config.train_vocab_cutoff)?;
//! ```
//!
//! ## Architecture
//!
//! - [`topology`] - grid distance functions over plane and torus
//! - [`corpus`] - CSR sparse corpus storage
//! - [`codebook`] - prototype vectors, BMU search, batch update, metrics
//! - [`neighborhood`] - adaptive per-cell radius field
//! - [`trainer`] - the epoch loop and convergence log
//! - [`semantic_map`] - the (term x cell) count table
//! - [`io`] - little-endian file primitives

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codebook;
pub mod config;
pub mod corpus;
pub mod error;
pub mod io;
pub mod neighborhood;
pub mod semantic_map;
pub mod topology;
pub mod trainer;

// Re-export commonly used types
pub use codebook::{Codebook, MatchingUnits};
pub use config::{derived_update_exponent, TrainConfig};
pub use corpus::SparseCorpus;
pub use error::{Result, SmapError};
pub use neighborhood::{Neighborhood, TopographicDiscontinuity};
pub use semantic_map::{SemanticMap, MAX_COUNT};
pub use topology::{DistanceKind, GlobalTopology, LocalTopology, Topology};
pub use trainer::{Trainer, TrainingMetrics};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Enumerates the vocabulary.
pub type TermIndex = u32;

/// Enumerates snippets and non-zero corpus entries.
pub type SnippetIndex = u32;

/// Enumerates the cells of the map; maps are capped at 65535 cells.
pub type CellIndex = u16;

/// Bounds the per-(cell, term) association frequency.
pub type Count = u32;

/// Per-entry weight class of a corpus term occurrence.
pub type Weight = u8;

/// The floating-point type used throughout training and on disk.
pub type Float = f32;
