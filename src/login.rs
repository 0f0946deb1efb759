use std::io::{BufRead, IsTerminal, Write};
use std::path::Path;
use std::sync::Arc;
use crate::auth::{Account, AuthClient};
use crate::settings::ApiEndpoint;
use crate::store::AccountStore;
use crate::Result;

const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginReason {
    /// No account is bound to the instance and no default exists.
    NoAccount,
    /// The user asked for the settings/login screen.
    Requested,
    /// The bound account could neither be validated nor refreshed.
    Expired,
}

#[derive(Debug, Clone)]
pub struct LoginRequest<'a> {
    pub game_dir: &'a Path,
    pub api: &'a ApiEndpoint,
    pub reason: LoginReason,
    pub previous: Option<&'a Account>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// At least one account was persisted and selected as the default.
    Completed,
    Cancelled,
}

/// The human-in-the-loop step. Implementations may block for as long as the
/// user needs; on `Completed` the store's default account is the one to use.
#[async_trait::async_trait(?Send)]
pub trait LoginPrompt {
    async fn prompt(&mut self, store: &mut dyn AccountStore, request: &LoginRequest<'_>) -> Result<LoginOutcome>;
}

/// Terminal login against the current API. Without a terminal on stdin the
/// prompt counts as cancelled, since the host launcher owns our stdio.
pub struct ConsoleLogin {
    client: Arc<dyn AuthClient>,
}

impl ConsoleLogin {
    pub fn new(client: Arc<dyn AuthClient>) -> Self {
        Self { client }
    }

    fn read_line(prompt: &str) -> Result<Option<String>> {
        eprint!("{}", prompt);
        std::io::stderr().flush()?;
        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

#[async_trait::async_trait(?Send)]
impl LoginPrompt for ConsoleLogin {
    async fn prompt(&mut self, store: &mut dyn AccountStore, request: &LoginRequest<'_>) -> Result<LoginOutcome> {
        if !std::io::stdin().is_terminal() {
            log::warn!("Login required for {} but no terminal is attached", request.game_dir.display());
            return Ok(LoginOutcome::Cancelled);
        }

        match request.reason {
            LoginReason::NoAccount => eprintln!("No account for {}.", request.game_dir.display()),
            LoginReason::Expired => eprintln!("The saved session has expired, please log in again."),
            LoginReason::Requested => {}
        }
        eprintln!("Log in to {} ({})", request.api.name, request.api.base_url);

        let previous_login = request.previous.and_then(|a| a.login.clone());

        for attempt in 1..=MAX_ATTEMPTS {
            let prompt = match &previous_login {
                Some(login) => format!("Email/username [{}]: ", login),
                None => "Email/username: ".to_string(),
            };
            let Some(mut login) = Self::read_line(&prompt)? else {
                return Ok(LoginOutcome::Cancelled);
            };
            if login.is_empty() {
                match &previous_login {
                    Some(previous) => login = previous.clone(),
                    None => return Ok(LoginOutcome::Cancelled),
                }
            }

            let password = rpassword::prompt_password("Password: ")?;
            if password.is_empty() {
                return Ok(LoginOutcome::Cancelled);
            }

            match self.client.authenticate(&request.api.base_url, &login, &password).await {
                Ok(response) => {
                    let accounts = response.into_accounts(&request.api.name, &login);
                    let Some(primary) = accounts.first().map(|a| a.id.clone()) else {
                        eprintln!("This account has no game profiles.");
                        return Ok(LoginOutcome::Cancelled);
                    };
                    for account in accounts {
                        eprintln!("  + {}", account.display_name);
                        store.add_or_update_account(account)?;
                    }
                    store.set_default_account(&primary)?;
                    return Ok(LoginOutcome::Completed);
                }
                Err(e) => {
                    log::warn!("Login attempt {}/{} failed: {}", attempt, MAX_ATTEMPTS, e);
                    eprintln!("Login failed: {}", e);
                }
            }
        }

        Ok(LoginOutcome::Cancelled)
    }
}
