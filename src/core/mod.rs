pub mod config;
pub mod errors;
pub mod http;
pub mod ids;
pub mod media;
pub mod models;

pub use config::Config;
pub use errors::{
    AnkiportError,
    Result,
};
pub use models::PortableNote;
