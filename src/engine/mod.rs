//! Command engine for labhost
//!
//! 1. Resolve hosts from the target or inventory
//! 2. Declare each host's deploy
//! 3. Converge (or dry-run) the fleet and display the reports

pub mod differ;
pub mod executor;

pub use executor::{apply, facts, list_deploys, plan};
