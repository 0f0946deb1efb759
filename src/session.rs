use std::future::Future;
use std::path::Path;
use std::time::Duration;
use chrono::Utc;
use crate::auth::{Account, AuthClient};
use crate::login::{LoginOutcome, LoginPrompt, LoginReason, LoginRequest};
use crate::settings::ApiEndpoint;
use crate::store::AccountStore;
use crate::{Error, Result};

/// Upper bound on any single auth server round trip, on top of the client's own timeouts.
const AUTH_CALL_TIMEOUT: Duration = Duration::from_secs(20);

enum Verification {
    Valid(Account),
    Failed(Account),
}

/// Maps a game directory to a usable account:
/// Unbound -> Bound-Valid | Bound-Expired -> (refresh) Bound-Valid | Reauthenticating -> Bound-Valid | Abandoned.
pub struct SessionResolver<'a> {
    store: &'a mut dyn AccountStore,
    client: &'a dyn AuthClient,
    login: &'a mut dyn LoginPrompt,
    api: ApiEndpoint,
}

impl<'a> SessionResolver<'a> {
    pub fn new(
        store: &'a mut dyn AccountStore,
        client: &'a dyn AuthClient,
        login: &'a mut dyn LoginPrompt,
        api: ApiEndpoint,
    ) -> Self {
        Self {
            store,
            client,
            login,
            api,
        }
    }

    /// Returns the account to launch `game_dir` with, or `None` when the user
    /// cancelled or every recovery path failed. `game_dir` must be normalized.
    pub async fn resolve(&mut self, game_dir: &Path, force_interactive: bool) -> Option<Account> {
        log::info!("Instance path: {}", game_dir.display());

        let bound = self.bound_account(game_dir);
        let candidate = bound.clone().or_else(|| self.default_account());

        let (reason, previous) = match candidate {
            None => {
                log::info!("No account bound to this instance");
                (LoginReason::NoAccount, None)
            }
            Some(account) if force_interactive => (LoginReason::Requested, Some(account)),
            Some(account) => {
                log::info!("Using account {}", account.display_name);
                match self.verify(account).await {
                    Verification::Valid(account) => {
                        let already_bound = bound.as_ref().map(|b| b.id == account.id).unwrap_or(false);
                        return Some(self.finish(game_dir, account, !already_bound));
                    }
                    Verification::Failed(account) => {
                        self.mark_invalid(account.clone());
                        (LoginReason::Expired, Some(account))
                    }
                }
            }
        };

        log::info!("Opening login prompt");
        let request = LoginRequest {
            game_dir,
            api: &self.api,
            reason,
            previous: previous.as_ref(),
        };
        match self.login.prompt(&mut *self.store, &request).await {
            Ok(LoginOutcome::Completed) => {}
            Ok(LoginOutcome::Cancelled) => {
                log::warn!("Login cancelled");
                return None;
            }
            Err(e) => {
                log::warn!("Login prompt failed: {}", e);
                return None;
            }
        }

        let Some(account) = self.default_account() else {
            log::warn!("Login finished without selecting an account");
            return None;
        };

        match self.verify(account).await {
            Verification::Valid(account) => {
                log::info!("Binding account {} to instance", account.display_name);
                Some(self.finish(game_dir, account, true))
            }
            Verification::Failed(account) => {
                self.mark_invalid(account);
                log::warn!("Freshly selected account could not be validated, giving up");
                None
            }
        }
    }

    fn bound_account(&self, game_dir: &Path) -> Option<Account> {
        let id = self.store.get_account_for_instance(game_dir)?;
        let account = self.store.get_account(&id);
        if account.is_none() {
            log::warn!("Instance is bound to missing account {}, ignoring binding", id);
        }
        account
    }

    fn default_account(&self) -> Option<Account> {
        let id = self.store.default_account()?;
        self.store.get_account(&id)
    }

    /// validate, then refresh. Every failure, including a timeout, moves to the next step.
    async fn verify(&mut self, mut account: Account) -> Verification {
        let validated = bounded(self.client.validate(
            &self.api.base_url,
            &account.access_token,
            account.client_token.clone(),
        ))
        .await;

        match validated {
            Ok(true) => {
                if account.invalid {
                    account.invalid = false;
                    self.persist(&account);
                }
                return Verification::Valid(account);
            }
            Ok(false) => log::info!("Token expired, refreshing"),
            Err(e) => log::warn!("Token validation failed: {}", e),
        }

        let profile = (!account.profile_bound).then(|| account.profile());
        let refreshed = bounded(self.client.refresh(
            &self.api.base_url,
            &account.access_token,
            account.client_token.clone(),
            profile,
        ))
        .await;

        match refreshed {
            Ok(response) => {
                account.apply_refresh(&response);
                self.persist(&account);
                Verification::Valid(account)
            }
            Err(e) => {
                log::warn!("Token refresh failed: {}", e);
                Verification::Failed(account)
            }
        }
    }

    fn finish(&mut self, game_dir: &Path, mut account: Account, bind: bool) -> Account {
        account.last_used = Some(Utc::now());
        self.persist(&account);
        if bind {
            if let Err(e) = self.store.set_instance_binding(game_dir, &account.id) {
                log::warn!("Failed to bind account to instance: {}", e);
            }
        }
        account
    }

    fn mark_invalid(&mut self, mut account: Account) {
        account.invalid = true;
        self.persist(&account);
    }

    fn persist(&mut self, account: &Account) {
        if let Err(e) = self.store.add_or_update_account(account.clone()) {
            log::warn!("Failed to save account {}: {}", account.display_name, e);
        }
    }
}

async fn bounded<T>(call: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(AUTH_CALL_TIMEOUT, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::Auth("auth server did not answer in time".to_string())),
    }
}
