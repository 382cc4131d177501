use crate::error::Error;

/// Supplies the HMAC key shared by the centralized site and its satellites.
pub trait SecretProvider: Send + Sync + 'static {
    fn secret(&self) -> &[u8];
}

/// Static shared secret. `Debug` never prints the key material.
#[derive(Clone)]
pub struct SharedSecret(Vec<u8>);

impl SharedSecret {
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty secret.
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self, Error> {
        let bytes = secret.into();
        if bytes.is_empty() {
            return Err(Error::Config("shared secret must not be empty".into()));
        }
        Ok(Self(bytes))
    }

    /// Reads the secret from `var`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the variable is unset or empty.
    pub fn from_env_var(var: &str) -> Result<Self, Error> {
        let value = std::env::var(var).map_err(|_| Error::Config(format!("{var} is required")))?;
        Self::new(value).map_err(|_| Error::Config(format!("{var} must not be empty")))
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

impl SecretProvider for SharedSecret {
    fn secret(&self) -> &[u8] {
        &self.0
    }
}
