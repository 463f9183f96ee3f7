//! formflow: a session state engine for conversational, LLM-backed
//! progressive forms.
//!
//! Define a form as a plain serde struct implementing
//! [`domain::form::FormModel`], wire a [`application::SessionStore`]
//! over the SQLite or in-memory adapters, and drive turns through
//! [`application::ProgressFormEngine`] or, with custom tools, through
//! [`application::FormOrchestrator`].

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
