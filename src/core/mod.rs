pub mod credentials;
pub mod executor;
pub mod plan;
pub mod settings;
pub mod subnet;

pub use credentials::{CredentialError, CredentialLayer, resolve_credentials};
pub use executor::{Executor, RequestOutcome, RunReport};
pub use plan::{ChangeSet, PathRule, Plan, WafAction};
pub use subnet::{DEFAULT_MAX_SUBNET_HOSTS, Ipv4Network, SubnetError};
