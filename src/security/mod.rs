pub mod command_executor;
pub mod token_manager;

pub use command_executor::{CommandError, SafeCommandExecutor};
pub use token_manager::{token_env_var, SecureTokenManager, DEFAULT_TOKEN_VAR};
