//! Read-only reference data: populations, institute profiles and candidates.

pub mod candidates;
pub mod institutes;
pub mod population;

pub use candidates::{CandidateRecord, CandidateRegistry};
pub use institutes::{InstituteProfile, InstituteTable, LayoutKind, PageRange};
pub use population::{PopulationDef, PopulationTable};
