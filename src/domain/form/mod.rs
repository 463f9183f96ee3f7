//! Form schema contract and typed conversational state.

mod schema;
mod state;

pub use schema::{FieldSpec, FormModel};
pub use state::FormState;
