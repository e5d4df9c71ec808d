//! Dialect types and normalizers/builders (C2, C5), plus the shared
//! canonical pivot they all translate through.

pub mod anthropic;
pub mod canonical;
pub mod openai;
pub mod responses;
