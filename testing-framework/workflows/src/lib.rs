pub mod bootstrap;
pub mod context;
pub mod workloads;

pub use bootstrap::{Bootstrap, BootstrapConfig, BootstrapError, ContractPaths};
pub use context::{NotBootstrapped, SharedContext};
pub use workloads::{
    UnknownWorkload, WorkloadKind, depend::DependencyBomber, ft::FtTransferUser,
    social::SocialDbUser, sweat::SweatUser,
};
