//! Client-side validation of user input before anything reaches the gateway.
//!
//! Each form turns raw text fields into the typed value the gateway takes,
//! or a [`ValidationError`] naming the first broken constraint.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use taskboard_proto::{ListId, NewList, NewTask, TaskPatch, UserId};

/// Minimum password length at sign-up.
pub const SIGNUP_MIN_PASSWORD: usize = 8;

/// Minimum password length when resetting a password.
pub const RESET_MIN_PASSWORD: usize = 6;

/// A form constraint the input violates.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The email field is blank.
    #[error("Email is required")]
    MissingEmail,

    /// The password field is blank.
    #[error("Password is required")]
    MissingPassword,

    /// The password is shorter than the form's minimum.
    #[error("Password must be at least {min} characters")]
    PasswordTooShort {
        /// Required minimum length in characters.
        min: usize,
    },

    /// Password and confirmation differ.
    #[error("Passwords do not match")]
    PasswordMismatch,

    /// A task or list name is blank.
    #[error("Please provide a name")]
    MissingName,

    /// The due date does not parse.
    #[error("Invalid due date: {0}")]
    BadDueDate(String),

    /// The action needs a signed-in user.
    #[error("You must be signed in to do that")]
    NotSignedIn,
}

/// Account registration input.
#[derive(Debug, Clone, Default)]
pub struct SignupForm {
    /// Email address.
    pub email: String,
    /// Chosen password.
    pub password: String,
    /// Password typed again.
    pub confirm_password: String,
}

impl SignupForm {
    /// Checks the form and returns the trimmed email.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint: blank email, blank or short
    /// password, or a confirmation that does not match.
    pub fn validate(&self) -> Result<String, ValidationError> {
        let email = self.email.trim();
        if email.is_empty() {
            return Err(ValidationError::MissingEmail);
        }
        check_password(&self.password, &self.confirm_password, SIGNUP_MIN_PASSWORD)?;
        Ok(email.to_string())
    }
}

/// New-password input on the reset page.
#[derive(Debug, Clone, Default)]
pub struct PasswordResetForm {
    /// New password.
    pub password: String,
    /// New password typed again.
    pub confirm_password: String,
}

impl PasswordResetForm {
    /// Checks the form.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_password(&self.password, &self.confirm_password, RESET_MIN_PASSWORD)
    }
}

fn check_password(password: &str, confirm: &str, min: usize) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::MissingPassword);
    }
    if password != confirm {
        return Err(ValidationError::PasswordMismatch);
    }
    if password.chars().count() < min {
        return Err(ValidationError::PasswordTooShort { min });
    }
    Ok(())
}

/// Create-list input.
#[derive(Debug, Clone, Default)]
pub struct NewListForm {
    /// List name.
    pub name: String,
}

impl NewListForm {
    /// Builds a [`NewList`] for the signed-in user.
    ///
    /// # Errors
    ///
    /// [`ValidationError::MissingName`] or [`ValidationError::NotSignedIn`].
    pub fn validate(&self, user: Option<&UserId>) -> Result<NewList, ValidationError> {
        let name = required_name(&self.name)?;
        let user_id = user.ok_or(ValidationError::NotSignedIn)?.clone();
        Ok(NewList { name, user_id })
    }
}

/// Add-task input.
#[derive(Debug, Clone, Default)]
pub struct NewTaskForm {
    /// Task name.
    pub name: String,
    /// Optional description; blank means none.
    pub description: String,
    /// Optional due date as typed; blank means none.
    pub due_date: String,
    /// Target list; `None` creates an unlisted task.
    pub list_id: Option<ListId>,
}

impl NewTaskForm {
    /// Builds a [`NewTask`] for the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingName`], [`ValidationError::BadDueDate`]
    /// or [`ValidationError::NotSignedIn`].
    pub fn validate(&self, user: Option<&UserId>) -> Result<NewTask, ValidationError> {
        let name = required_name(&self.name)?;
        let due_date = parse_due_date(&self.due_date)?;
        let user_id = user.ok_or(ValidationError::NotSignedIn)?.clone();
        Ok(NewTask {
            name,
            description: optional_text(&self.description),
            due_date,
            user_id,
            list_id: self.list_id.clone(),
        })
    }
}

/// Edit-task input. Every field is written back; blanks clear.
#[derive(Debug, Clone, Default)]
pub struct TaskEditForm {
    /// Task name.
    pub name: String,
    /// Description; blank clears it.
    pub description: String,
    /// Due date; blank clears it.
    pub due_date: String,
}

impl TaskEditForm {
    /// Builds the patch that saves the form.
    ///
    /// # Errors
    ///
    /// [`ValidationError::MissingName`] or [`ValidationError::BadDueDate`].
    pub fn validate(&self) -> Result<TaskPatch, ValidationError> {
        Ok(TaskPatch {
            name: Some(required_name(&self.name)?),
            description: Some(optional_text(&self.description)),
            due_date: Some(parse_due_date(&self.due_date)?),
            ..TaskPatch::default()
        })
    }
}

fn required_name(raw: &str) -> Result<String, ValidationError> {
    let name = raw.trim();
    if name.is_empty() {
        Err(ValidationError::MissingName)
    } else {
        Ok(name.to_string())
    }
}

fn optional_text(raw: &str) -> Option<String> {
    let text = raw.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Parses a due date typed as RFC 3339, `YYYY-MM-DDTHH:MM` or `YYYY-MM-DD`.
/// Times without an offset are taken as UTC; a bare date means midnight.
///
/// # Errors
///
/// Returns [`ValidationError::BadDueDate`] if none of the formats match.
pub fn parse_due_date(raw: &str) -> Result<Option<DateTime<Utc>>, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M") {
        return Ok(Some(naive.and_utc()));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Some(naive.and_utc()))
        .ok_or_else(|| ValidationError::BadDueDate(raw.to_string()))
}
