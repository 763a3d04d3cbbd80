pub mod reclamation;

pub use reclamation::{ReclamationConfig, ReclamationScheduler, SweepReport, SweepState};
