pub mod config;
pub mod enrichment;
pub mod errors;
pub mod target;

pub use enrichment::{CompanyProfile, EnrichmentError, EnrichmentProvider};
pub use errors::{ApplicationError, InterfaceError};
pub use target::{LookupTarget, TargetError};
