//! Login and signup screens shown before a shell starts.
//!
//! A new connection sees the title and message of the day, picks login or
//! signup from a keyed menu, and retries until it authenticates. Every failed
//! attempt counts against `max_attempts`; when it runs out the session is
//! closed.

use terminal::style::{accent, notice};
use terminal::{KeyedOption, TerminalError, TerminalSession, User};
use thiserror::Error;

use crate::accounts::{AccountError, CredentialStore};

/// Longest accepted username or password.
pub const MAX_FIELD_LENGTH: usize = 64;

/// Shortest accepted username at signup.
pub const MIN_USERNAME_LENGTH: usize = 3;

/// Why a login did not produce a user.
#[derive(Debug, Error)]
pub enum LoginError {
    /// The connection went away.
    #[error(transparent)]
    Terminal(#[from] TerminalError),

    /// The client used up its attempts; the session has been closed.
    #[error("too many failed attempts")]
    TooManyAttempts,

    /// The credential store failed; the session has been closed.
    #[error(transparent)]
    Account(AccountError),
}

/// Settings for the login screens.
#[derive(Debug, Clone)]
pub struct LoginOptions {
    /// Shown under the title on the first screen.
    pub motd: String,
    /// Failed attempts allowed before the session is closed.
    pub max_attempts: u32,
}

impl Default for LoginOptions {
    fn default() -> Self {
        Self {
            motd: String::new(),
            max_attempts: 5,
        }
    }
}

/// Runs the login screens on `session`.
///
/// On success the user is attached to the session and the screen cleared.
pub async fn login(
    session: &TerminalSession,
    store: &dyn CredentialStore,
    options: &LoginOptions,
) -> Result<User, LoginError> {
    let mut flow = LoginFlow {
        session,
        store,
        options,
        failures: 0,
    };
    let user = flow.run().await?;
    session.set_user(user.clone())?;
    session.clear_screen()?;

    tracing::info!(peer = %session.peer(), username = %user.username, "User logged in");
    Ok(user)
}

struct LoginFlow<'a> {
    session: &'a TerminalSession,
    store: &'a dyn CredentialStore,
    options: &'a LoginOptions,
    failures: u32,
}

impl LoginFlow<'_> {
    async fn run(&mut self) -> Result<User, LoginError> {
        self.session.write_title("whirlnet")?;
        if !self.options.motd.is_empty() {
            self.session.newline()?;
            self.session.write(&notice(&self.options.motd))?;
        }

        let choice = self
            .session
            .prompt_choice(
                &[KeyedOption::new('l', "login"), KeyedOption::new('s', "signup")],
                true,
            )
            .await?;
        self.session.clear_screen()?;

        if choice.is_some_and(|option| option.key == 's') {
            self.signup().await?;
            self.session.clear_screen()?;
            self.session.write("User created! Please log in.")?;
            self.session.newline()?;
        }
        self.login().await
    }

    async fn login(&mut self) -> Result<User, LoginError> {
        loop {
            self.session.write_title("whirlnet login")?;
            let username = self.prompt_username().await?;
            let password = self.prompt_password("password (not echoed, max 64)").await?;

            match self.store.authenticate(&username, &password) {
                Ok(user) => return Ok(user),
                Err(AccountError::NotFound) => {
                    tracing::debug!(peer = %self.session.peer(), username = %username, "Login failed");
                    self.fail("That user wasn't found, or the password was invalid.")
                        .await?;
                }
                Err(e) => return Err(self.storage_failure(e).await),
            }
        }
    }

    async fn signup(&mut self) -> Result<User, LoginError> {
        loop {
            self.session.write_title("whirlnet signup")?;
            let username = self.prompt_username().await?;
            let password = self.prompt_password("password (not echoed, max 64)").await?;
            let confirmation = self.prompt_password("password again to confirm").await?;

            if let Some(problem) = signup_problem(&username, &password) {
                self.fail(problem).await?;
                continue;
            }
            if password != confirmation {
                self.fail("The passwords didn't match! try again.").await?;
                continue;
            }

            match self.store.register(&username, &password) {
                Ok(user) => {
                    tracing::info!(peer = %self.session.peer(), username = %username, "Account created");
                    return Ok(user);
                }
                Err(AccountError::AlreadyExists { .. }) => {
                    self.fail("The username is in use! try again.").await?;
                }
                Err(e) => return Err(self.storage_failure(e).await),
            }
        }
    }

    async fn prompt_username(&self) -> Result<String, TerminalError> {
        self.session
            .prompt_line(&field_prompt("username"), true, Some(MAX_FIELD_LENGTH))
            .await
    }

    async fn prompt_password(&self, label: &str) -> Result<String, TerminalError> {
        self.session
            .prompt_secret(&field_prompt(label), MAX_FIELD_LENGTH)
            .await
    }

    /// Reports a failed attempt and closes the session once attempts run out.
    async fn fail(&mut self, message: &str) -> Result<(), LoginError> {
        self.session.clear_screen()?;
        self.session.write(message)?;
        self.session.newline()?;

        self.failures += 1;
        if self.failures >= self.options.max_attempts {
            tracing::warn!(
                peer = %self.session.peer(),
                attempts = self.failures,
                "Too many failed login attempts"
            );
            self.session.write("Too many attempts.")?;
            self.session.newline()?;
            self.session.await_drain().await?;
            self.session.close();
            return Err(LoginError::TooManyAttempts);
        }
        Ok(())
    }

    async fn storage_failure(&self, error: AccountError) -> LoginError {
        tracing::error!(peer = %self.session.peer(), error = %error, "Credential store failed");
        if self.session.newline().is_ok()
            && self
                .session
                .write("Accounts are unavailable right now, try again later.")
                .is_ok()
        {
            let _ = self.session.newline();
            let _ = self.session.await_drain().await;
        }
        self.session.close();
        LoginError::Account(error)
    }
}

/// Checks a new account's username and password, returning the message to
/// show when they are not acceptable.
pub fn signup_problem(username: &str, password: &str) -> Option<&'static str> {
    if password.is_empty() {
        Some("Your password can't be blank!")
    } else if username.chars().count() < MIN_USERNAME_LENGTH {
        Some("Your username must be at least 3 characters!")
    } else {
        None
    }
}

fn field_prompt(label: &str) -> String {
    format!("{} //", accent(label))
}
