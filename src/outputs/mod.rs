//! Persistence of synthesis documents and the archive index.
//!
//! # Submodules
//!
//! - [`archive`]: Writes the dated synthesis document, the raw article dump
//!   and the debug copy of an unparseable response
//! - [`index`]: Rebuilds `index.json` from the archive directory
//!
//! # Output Structure
//!
//! ```text
//! data_dir/
//! ├── 2025-05-05.json
//! ├── 2025-05-06.json
//! └── index.json
//! ```

pub mod archive;
pub mod index;
