//! Gateway credential storage and the interactive sign-in/sign-out flows.
//!
//! The token lives in the OS keyring under a single service entry. When the
//! keyring is unavailable (headless machines, locked collections) lookups
//! fall back to the `PALABRE_TOKEN` environment variable.

pub mod state;

use std::fmt;
use std::io::{self, Write};

use tracing::warn;

use crate::platform::http::HttpPlatform;
use crate::platform::PlatformAuth;

pub const KEYRING_SERVICE: &str = "palabre";
pub const KEYRING_USER: &str = "gateway";
pub const TOKEN_ENV_VAR: &str = "PALABRE_TOKEN";

#[derive(Debug)]
pub enum KeyringAccessError {
    /// The keyring backend itself failed; a token may still exist.
    Recoverable(String),
    /// The stored entry is unusable and needs to be re-created.
    Permanent(String),
}

impl fmt::Display for KeyringAccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyringAccessError::Recoverable(msg) => {
                write!(f, "keyring unavailable: {msg}")
            }
            KeyringAccessError::Permanent(msg) => {
                write!(f, "keyring entry unusable: {msg}")
            }
        }
    }
}

impl std::error::Error for KeyringAccessError {}

impl From<keyring::Error> for KeyringAccessError {
    fn from(err: keyring::Error) -> Self {
        match &err {
            keyring::Error::PlatformFailure(_) | keyring::Error::NoStorageAccess(_) => {
                KeyringAccessError::Recoverable(err.to_string())
            }
            _ => KeyringAccessError::Permanent(err.to_string()),
        }
    }
}

/// Stores and retrieves the gateway token.
pub struct AuthManager {
    use_keyring: bool,
}

impl AuthManager {
    pub fn new() -> Self {
        Self::new_with_keyring(true)
    }

    /// Tests construct with `false` to keep the OS keyring untouched.
    pub fn new_with_keyring(use_keyring: bool) -> Self {
        Self { use_keyring }
    }

    fn entry(&self) -> Result<keyring::Entry, KeyringAccessError> {
        keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER).map_err(KeyringAccessError::from)
    }

    pub fn store_token(&self, token: &str) -> Result<(), KeyringAccessError> {
        if !self.use_keyring {
            return Ok(());
        }
        self.entry()?
            .set_password(token)
            .map_err(KeyringAccessError::from)
    }

    pub fn stored_token(&self) -> Result<Option<String>, KeyringAccessError> {
        if !self.use_keyring {
            return Ok(None);
        }
        match self.entry()?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(KeyringAccessError::from(err)),
        }
    }

    pub fn remove_token(&self) -> Result<(), KeyringAccessError> {
        if !self.use_keyring {
            return Ok(());
        }
        match self.entry()?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(KeyringAccessError::from(err)),
        }
    }

    /// Keyring first, then the `PALABRE_TOKEN` environment variable. Keyring
    /// failures are logged and treated as a miss so a headless session can
    /// still run.
    pub fn resolve_token(&self) -> Option<String> {
        match self.stored_token() {
            Ok(Some(token)) => return Some(token),
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "Keyring lookup failed, falling back to environment");
            }
        }
        env_token()
    }
}

impl Default for AuthManager {
    fn default() -> Self {
        Self::new()
    }
}

fn env_token() -> Option<String> {
    std::env::var(TOKEN_ENV_VAR)
        .ok()
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

fn parse_confirmation(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

fn prompt_line(prompt: &str) -> io::Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input)
}

/// Prompt for a token, verify it against the gateway, and store it.
pub async fn interactive_auth(
    manager: &AuthManager,
    base_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔐 Gateway sign-in");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Paste an API token for {base_url}.");
    println!();

    let token = prompt_line("Token: ")?;
    let token = token.trim();
    if token.is_empty() {
        println!("❌ No token entered.");
        return Ok(());
    }

    let platform = HttpPlatform::new(base_url, token);
    match platform.whoami().await? {
        Some(user) => {
            manager.store_token(token)?;
            println!("✅ Signed in as {}.", user.username);
        }
        None => {
            println!("❌ The gateway rejected that token.");
        }
    }
    Ok(())
}

/// Confirm, tell the gateway to end the session, and remove the stored token.
pub async fn interactive_deauth(
    manager: &AuthManager,
    base_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let stored = match manager.stored_token() {
        Ok(token) => token,
        Err(err) => {
            println!("⚠️  {err}");
            None
        }
    };
    let token = match stored.clone().or_else(env_token) {
        Some(token) => token,
        None => {
            println!("No gateway token is stored.");
            return Ok(());
        }
    };

    let answer = prompt_line("Sign out and remove the stored token? [y/N]: ")?;
    if !parse_confirmation(&answer) {
        println!("Cancelled.");
        return Ok(());
    }

    let platform = HttpPlatform::new(base_url, &token);
    if let Err(err) = platform.sign_out().await {
        println!("⚠️  Gateway sign-out failed: {err}");
    }

    if stored.is_some() {
        manager.remove_token()?;
    }
    println!("✅ Signed out.");
    if std::env::var(TOKEN_ENV_VAR).is_ok() {
        println!("⚠️  {TOKEN_ENV_VAR} is still set and will be used for future sessions.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::TestEnvVarGuard;

    #[test]
    fn confirmation_accepts_yes_in_either_form() {
        assert!(parse_confirmation("y"));
        assert!(parse_confirmation("YES"));
        assert!(parse_confirmation("  yes  "));
    }

    #[test]
    fn confirmation_defaults_to_no() {
        assert!(!parse_confirmation(""));
        assert!(!parse_confirmation("n"));
        assert!(!parse_confirmation("no"));
        assert!(!parse_confirmation("maybe"));
    }

    #[test]
    fn keyring_failures_split_into_recoverable_and_permanent() {
        let backend_down = keyring::Error::NoStorageAccess(Box::new(std::io::Error::new(
            std::io::ErrorKind::Other,
            "collection locked",
        )));
        assert!(matches!(
            KeyringAccessError::from(backend_down),
            KeyringAccessError::Recoverable(_)
        ));

        let bad_entry = keyring::Error::BadEncoding(vec![0xff]);
        assert!(matches!(
            KeyringAccessError::from(bad_entry),
            KeyringAccessError::Permanent(_)
        ));
    }

    #[test]
    fn disabled_keyring_reads_nothing_and_stores_nothing() {
        let manager = AuthManager::new_with_keyring(false);
        assert!(manager.store_token("secret").is_ok());
        assert_eq!(manager.stored_token().unwrap(), None);
        assert!(manager.remove_token().is_ok());
    }

    #[test]
    fn resolve_token_falls_back_to_the_environment() {
        let mut guard = TestEnvVarGuard::new();
        guard.set_var(TOKEN_ENV_VAR, "env-token");

        let manager = AuthManager::new_with_keyring(false);
        assert_eq!(manager.resolve_token().as_deref(), Some("env-token"));
    }

    #[test]
    fn blank_environment_tokens_are_ignored() {
        let mut guard = TestEnvVarGuard::new();
        guard.set_var(TOKEN_ENV_VAR, "   ");

        let manager = AuthManager::new_with_keyring(false);
        assert_eq!(manager.resolve_token(), None);
    }
}
