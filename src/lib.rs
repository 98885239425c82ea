//! Gemini Talk Library
//!
//! Client core for Gemini chat: streamed replies cut into spoken statements,
//! multipart and resumable file uploads, and local persistence.

pub mod api;
pub mod speech;
pub mod storage;
pub mod stream;
pub mod types;
pub mod upload;
