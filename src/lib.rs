//! Document processing pipeline: OCR extraction plus LLM summarization.
//!
//! A document comes in as raw bytes (PDF, JPEG or PNG), gets run through an
//! OCR backend to produce line-level text, and the text is then summarized
//! down to at most three lines by a text-generation backend. Callers can do
//! this inline in a single request, or asynchronously: create a job, upload
//! the bytes, and poll until the job reaches a terminal state.
//!
//! The interesting part is [`pipeline`], which drives the
//! `pending → processing → {complete|failed}` state machine using nothing
//! but compare-and-swap writes against the [`jobs::store::JobStore`]. The
//! OCR and generation backends are capability traits ([`extract`] and
//! [`summarize`]) with AWS implementations, so tests run entirely offline.

pub mod api;
pub mod aws;
pub mod blob;
pub mod cmd;
pub mod extract;
pub mod fields;
pub mod jobs;
pub mod pipeline;
pub mod prelude;
pub mod summarize;
