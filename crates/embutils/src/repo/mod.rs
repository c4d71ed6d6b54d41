//! Repository maintenance: firmware versions, IDE builds and developer tasks.

pub mod build;
pub mod tasks;
pub mod version;

pub use build::{build_cubeide, build_iar};
pub use tasks::{date_version, Task, TaskRunner};
pub use version::{
    CHeaderExporter, GitBuildUpdater, SimpleVersionStorage, SvnBuildUpdater, VersionExporter,
    VersionHandler, VersionStorage, VersionUpdater, UNVERSIONED_BUILD,
};
