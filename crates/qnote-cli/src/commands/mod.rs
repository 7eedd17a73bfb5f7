//! Command handlers

pub mod archive;
pub mod book;
pub mod config;
pub mod note;
pub mod tag;
