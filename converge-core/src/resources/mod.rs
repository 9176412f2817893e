//! Managed database resource kinds.

pub mod autonomous_database;
pub mod container_database;

pub use autonomous_database::{AutonomousDatabase, AutonomousDatabaseObserved, AutonomousDatabaseSpec};
pub use container_database::{ContainerDatabase, ContainerDatabaseObserved, ContainerDatabaseSpec};
