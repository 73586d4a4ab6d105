use clap::{ArgAction, Parser, ValueEnum};

/// Store implementation backing the tenant sessions.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// HashiCorp Vault KV v2
    Vault,
    /// Process memory (testing only, state is lost on exit)
    Memory,
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Vault => "vault",
            Backend::Memory => "memory",
        }
    }
}

/// Configuration for the tfstate-server.
#[derive(Parser, Debug, Clone)]
#[command(name = "tfstate-server")]
#[command(about = "Terraform HTTP state backend storing state in HashiCorp Vault")]
pub struct Config {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8080", env = "LISTEN_ADDRESS")]
    pub listen_address: String,

    /// Vault server URL
    #[arg(long, default_value = "http://localhost:8200", env = "VAULT_URL")]
    pub vault_url: String,

    /// Path prefix for state entries inside the Vault mount
    #[arg(long, default_value = "vbk", env = "VAULT_PREFIX")]
    pub vault_prefix: String,

    /// Vault KV v2 mount path
    #[arg(long, default_value = "secret", env = "VAULT_STORE")]
    pub vault_store: String,

    /// Store backend
    #[arg(long, value_enum, default_value_t = Backend::Vault, env = "STATE_BACKEND")]
    pub backend: Backend,

    /// Drop a tenant's session after a successful unlock
    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "EVICT_ON_UNLOCK")]
    pub evict_on_unlock: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, env = "DEBUG")]
    pub debug: bool,
}
