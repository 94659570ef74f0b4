//! whisper.cpp model management.

pub mod catalog;
pub mod download;
