use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "cadence",
    about = "Materialization worker for recurring events",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one materialization pass across all organizations
    Run,
    /// Run the materialization stages for a single organization
    RunOrg {
        /// Organization id
        organization_id: Uuid,
    },
    /// Show materialization status for one organization
    Status {
        /// Organization id
        organization_id: Uuid,
    },
    /// Show processing statistics across all organizations
    Stats,
    /// Delete instances past each organization's retention horizon
    Cleanup,
}
