pub mod hosts;
pub mod paths;
pub mod settings;

pub use hosts::{AuthKind, Host, HostsFile};
pub use settings::{HostKeyPolicy, IdentityConfig, ServerConfig, SshConfig, TokenGrant};
