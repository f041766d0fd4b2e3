//! HTTP download of the source file

pub mod download;
pub mod uri;

pub use download::download_file;
pub use uri::SourceUrl;
