pub mod anki;
pub mod cli;
pub mod clone;
pub mod core;
pub mod export;
pub mod package;
pub mod persistence;
pub mod reorder;
pub mod tags;
pub mod translate;

pub use crate::core::{
    AnkiportError,
    Config,
    PortableNote,
    Result,
};
