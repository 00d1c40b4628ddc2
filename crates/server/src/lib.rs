//! Registry HTTP service: exposes a [`delta_registry::JobRegistry`] over
//! JSON so operators can manage jobs and workers can commit capture state.

pub mod api;
pub mod router;
pub mod state;

pub use router::build_router;
pub use state::AppState;
