//! Library half of the `sdc-notebook` binary.
//!
//! The description notebooks are expressed as data ([`notebook::Section`]
//! and [`notebook::Step`]) so they can be built and inspected without a
//! database, then replayed against any [`sdc_core::DataSource`].

pub mod cli;
pub mod notebook;
pub mod output;

pub use cli::{Cli, Command};
pub use notebook::{Section, Step, Variant, run_notebook, run_step, therapeutics_description};
pub use output::NotebookOutput;
