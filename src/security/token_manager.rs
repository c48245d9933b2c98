//! Registry token handling with masking
//!
//! The token is held as a [`SecretString`] and only ever leaves this module
//! as a per-invocation environment override for the publish child process.
//! Nothing here reads or writes the current process environment.

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};

/// Variable cargo reads the default registry's token from
pub const DEFAULT_TOKEN_VAR: &str = "CARGO_REGISTRY_TOKEN";

/// Environment variable name carrying the token for `registry`
///
/// The default registry uses `CARGO_REGISTRY_TOKEN`; a named registry uses
/// `CARGO_REGISTRIES_<NAME>_TOKEN` with every non-alphanumeric character of
/// the name replaced by `_`.
///
/// # Examples
///
/// ```
/// use publish_crates::security::token_env_var;
///
/// assert_eq!(token_env_var(None), "CARGO_REGISTRY_TOKEN");
/// assert_eq!(token_env_var(Some("my-registry")), "CARGO_REGISTRIES_MY_REGISTRY_TOKEN");
/// ```
pub fn token_env_var(registry: Option<&str>) -> String {
    match registry {
        None => DEFAULT_TOKEN_VAR.to_string(),
        Some(name) => {
            let normalized: String = name
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() {
                        c.to_ascii_uppercase()
                    } else {
                        '_'
                    }
                })
                .collect();
            format!("CARGO_REGISTRIES_{}_TOKEN", normalized)
        }
    }
}

/// Token for the registry of one run
///
/// # Examples
///
/// ```
/// use publish_crates::security::SecureTokenManager;
/// use secrecy::SecretString;
///
/// let manager = SecureTokenManager::new(
///     Some("internal".to_string()),
///     Some(SecretString::new("abcdef123456".into())),
/// );
/// let env = manager.env_override().unwrap();
/// assert_eq!(env.0, "CARGO_REGISTRIES_INTERNAL_TOKEN");
/// assert_eq!(manager.mask_tokens_in_string("token abcdef123456"), "token abc...456");
/// ```
#[derive(Debug, Default)]
pub struct SecureTokenManager {
    registry: Option<String>,
    token: Option<SecretString>,
}

impl SecureTokenManager {
    pub fn new(registry: Option<String>, token: Option<SecretString>) -> Self {
        let token = token.filter(|t| !t.expose_secret().trim().is_empty());
        Self { registry, token }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Name of the variable the token is passed in
    pub fn token_name(&self) -> String {
        token_env_var(self.registry.as_deref())
    }

    /// `(name, token)` to add to the publish child's environment, if a token is set
    pub fn env_override(&self) -> Option<(String, &SecretString)> {
        self.token.as_ref().map(|token| (self.token_name(), token))
    }

    /// Masks a token for safe logging
    ///
    /// Shows only the first 3 and last 3 characters for identification purposes.
    /// Tokens shorter than 10 characters are fully masked as "****".
    pub fn mask_token(&self, token: &str) -> String {
        let chars: Vec<char> = token.chars().collect();
        if chars.len() < 10 {
            return "****".to_string();
        }

        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 3..].iter().collect();
        format!("{}...{}", prefix, suffix)
    }

    /// Replace every occurrence of the token in `text` with its masked form
    pub fn mask_tokens_in_string(&self, text: &str) -> String {
        let Some(token) = &self.token else {
            return text.to_string();
        };

        let token_str = token.expose_secret();
        match Regex::new(&regex::escape(token_str)) {
            Ok(regex) => regex
                .replace_all(text, self.mask_token(token_str).as_str())
                .into_owned(),
            Err(_) => text.replace(token_str, &self.mask_token(token_str)),
        }
    }
}
