//! Login and registration flow.
//!
//! Validates the form locally, exchanges credentials for a token, and stores
//! the token in the [`Session`] only on success. Server error codes map to a
//! fixed table of field-level messages so the form can flag the right input.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{ServiceError, SessionError};
use crate::model::Registration;
use crate::service::AuthService;
use crate::session::{Navigate, Session};

/// Which form is being submitted; selects the fallback message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Login,
    Register,
}

/// The form input an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Username,
    Password,
    Email,
    /// Not tied to one input; shown as a form-wide notice.
    Form,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Username => "username",
            Self::Password => "password",
            Self::Email => "email",
            Self::Form => "form",
        })
    }
}

/// A message to show next to a form input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldError {
    pub field: Field,
    pub message: &'static str,
}

impl FieldError {
    const fn new(field: Field, message: &'static str) -> Self {
        Self { field, message }
    }

    /// Map a service failure to the field and message to display.
    pub fn from_service(mode: AuthMode, err: &ServiceError) -> Self {
        if let ServiceError::Domain { code } = err {
            if let Some(mapped) = Self::from_code(code) {
                return mapped;
            }
        }
        if err.is_transport() {
            return Self::new(Field::Form, "Ошибка соединения с сервером");
        }
        match mode {
            AuthMode::Login => Self::new(Field::Form, "Ошибка при входе"),
            AuthMode::Register => Self::new(Field::Form, "Ошибка при регистрации"),
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        let mapped = match code {
            "incorrect_password" => Self::new(Field::Password, "Неверный пароль"),
            "user_not_found" => Self::new(Field::Username, "Пользователь не найден"),
            "username_exists" => Self::new(Field::Username, "Пользователь уже существует"),
            "email_exists" => {
                Self::new(Field::Email, "Пользователь с таким email уже существует")
            }
            "empty_password" => Self::new(Field::Password, "Пароль не может быть пустым"),
            "invalid_username" => Self::new(Field::Username, "Некорректное имя пользователя"),
            _ => return None,
        };
        Some(mapped)
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Why a login or registration did not produce a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    /// The form was invalid or the server refused the credentials.
    #[error("{}", join(.errors))]
    Rejected { errors: Vec<FieldError> },

    /// The token was issued but could not be stored.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl AuthFailure {
    /// Field errors to flag, empty for storage failures.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::Rejected { errors } => errors,
            Self::Session(_) => &[],
        }
    }

    /// The error for a specific field, if any.
    pub fn for_field(&self, field: Field) -> Option<&FieldError> {
        self.field_errors().iter().find(|e| e.field == field)
    }
}

fn join(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Drives the login and registration forms against an [`AuthService`].
pub struct AuthFlow {
    service: Arc<dyn AuthService>,
    session: Session,
}

impl AuthFlow {
    pub fn new(service: Arc<dyn AuthService>, session: Session) -> Self {
        Self { service, session }
    }

    /// Sign in and store the token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthFailure::Rejected`] for empty inputs or a refused
    /// login (nothing is stored), or [`AuthFailure::Session`] if the token
    /// cannot be saved.
    pub async fn login(&self, username: &str, password: &str) -> Result<Navigate, AuthFailure> {
        let mut errors = Vec::new();
        require(&mut errors, Field::Username, username, "Введите имя пользователя");
        require(&mut errors, Field::Password, password, "Введите пароль");
        if !errors.is_empty() {
            return Err(AuthFailure::Rejected { errors });
        }

        match self.service.login(username.trim(), password).await {
            Ok(token) => self.complete(&token, AuthMode::Login).await,
            Err(err) => Err(Self::refused(AuthMode::Login, &err)),
        }
    }

    /// Create an account, then sign in with the returned token.
    ///
    /// # Errors
    ///
    /// Same as [`login`](Self::login).
    pub async fn register(&self, registration: &Registration) -> Result<Navigate, AuthFailure> {
        let mut errors = Vec::new();
        require(&mut errors, Field::Username, &registration.username, "Введите имя пользователя");
        require(&mut errors, Field::Password, &registration.password, "Введите пароль");
        require(&mut errors, Field::Email, &registration.email, "Введите email");
        if !errors.is_empty() {
            return Err(AuthFailure::Rejected { errors });
        }

        let trimmed = Registration {
            username: registration.username.trim().to_owned(),
            password: registration.password.clone(),
            email: registration.email.trim().to_owned(),
        };
        match self.service.register(&trimmed).await {
            Ok(token) => self.complete(&token, AuthMode::Register).await,
            Err(err) => Err(Self::refused(AuthMode::Register, &err)),
        }
    }

    /// Forget the stored token.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the token cannot be removed.
    pub async fn logout(&self) -> Result<Navigate, SessionError> {
        self.session.sign_out().await?;
        info!("signed out");
        Ok(Navigate::Login)
    }

    async fn complete(&self, token: &str, mode: AuthMode) -> Result<Navigate, AuthFailure> {
        if token.trim().is_empty() {
            warn!(?mode, "server returned an empty token");
            return Err(Self::refused(
                mode,
                &ServiceError::Decode {
                    reason: "empty access token".to_owned(),
                },
            ));
        }
        self.session.sign_in(token).await?;
        info!(?mode, "signed in");
        Ok(Navigate::DocumentList)
    }

    fn refused(mode: AuthMode, err: &ServiceError) -> AuthFailure {
        warn!(?mode, error = %err, "authentication refused");
        AuthFailure::Rejected {
            errors: vec![FieldError::from_service(mode, err)],
        }
    }
}

fn require(errors: &mut Vec<FieldError>, field: Field, value: &str, message: &'static str) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, message));
    }
}
