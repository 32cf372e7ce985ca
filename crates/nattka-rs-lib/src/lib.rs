pub mod error;
pub use error::Result;
pub use error::Error;

pub mod config;
pub use config::Config;

pub mod keyword;

pub mod repository;
pub use repository::Repository;
pub use repository::PackageCandidate;

pub mod bug;
pub use bug::{BugRecord, BugCategory, BugTracker};

pub mod package_list;
pub use package_list::MatchError;

pub mod depgraph;
pub mod checker;
pub use checker::DependencyChecker;

pub mod git;
pub mod cache;
pub mod sanity_check;
pub mod actions;
