/// Where sessions store their entries in Vault.
///
/// Entries live in a KV v2 mount:
/// ```text
/// {address}/v1/{store}/data/{prefix}/{name}        # state entries and lock records
/// {address}/v1/{store}/metadata/{prefix}/{name}    # deletion (all versions)
/// ```
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Vault server URL, e.g. `http://localhost:8200`.
    pub address: String,
    /// Path prefix for all entries inside the mount.
    pub prefix: String,
    /// KV v2 mount path, e.g. `secret`.
    pub store: String,
}

impl VaultConfig {
    pub fn new(
        address: impl Into<String>,
        prefix: impl Into<String>,
        store: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            prefix: prefix.into(),
            store: store.into(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.address.trim_end_matches('/'), path)
    }

    /// URL of the secret holding `name`.
    pub fn data_url(&self, name: &str) -> String {
        self.api_url(&format!("{}/data/{}/{}", self.store, self.prefix, name))
    }

    /// URL of the metadata of `name`; deleting it removes every version.
    pub fn metadata_url(&self, name: &str) -> String {
        self.api_url(&format!("{}/metadata/{}/{}", self.store, self.prefix, name))
    }

    /// AppRole login endpoint.
    pub fn login_url(&self) -> String {
        self.api_url("auth/approle/login")
    }
}
