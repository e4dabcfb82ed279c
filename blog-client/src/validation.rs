//! Client-side form validation.
//!
//! Failures are reported per field and never reach the server.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{ImageUpload, LoginRequest, PostForm, ProfileForm, SignupRequest};

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
const ALLOWED_IMAGE_TYPES: [&str; 2] = ["image/jpeg", "image/png"];
const PASSWORD_SPECIALS: &str = "@$!%*?&";

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});
static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z ]+$").expect("name pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    fn push(&mut self, field: &'static str, message: impl Into<String>) {
        // first failing rule per field wins, like an inline form error
        if self.errors.iter().all(|e| e.field != field) {
            self.errors.push(FieldError {
                field,
                message: message.into(),
            });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn message_for(&self, field: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }

    fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

fn check_email(errors: &mut ValidationErrors, email: &str) {
    if email.is_empty() {
        errors.push("email", "Email is required");
    } else if email.len() > 100 {
        errors.push("email", "Maximum 100 characters");
    } else if !EMAIL_RE.is_match(email) {
        errors.push("email", "Enter a valid email");
    }
}

fn check_password_strength(errors: &mut ValidationErrors, password: &str, min: usize) {
    if password.is_empty() {
        errors.push("password", "Password is required");
        return;
    }
    if password.chars().any(char::is_whitespace) {
        errors.push("password", "Spaces are not allowed");
    }
    if password.chars().count() < min {
        errors.push("password", format!("Minimum {min} characters"));
    }
    let strong = password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| PASSWORD_SPECIALS.contains(c));
    if !strong {
        errors.push(
            "password",
            "Password must include uppercase, lowercase, number & special character",
        );
    }
}

fn check_name(errors: &mut ValidationErrors, field: &'static str, label: &str, value: &str, min: usize) {
    let len = value.chars().count();
    if value.trim().is_empty() {
        errors.push(field, format!("{label} is required"));
    } else if len < min {
        errors.push(field, format!("Minimum {min} characters"));
    } else if len > 30 {
        errors.push(field, "Maximum 30 characters");
    } else if !NAME_RE.is_match(value) {
        errors.push(field, "Only letters allowed");
    }
}

fn check_image(errors: &mut ValidationErrors, image: &ImageUpload) {
    if !ALLOWED_IMAGE_TYPES.contains(&image.mime.as_str()) {
        errors.push("file", "You can only upload JPG/PNG files");
    } else if image.bytes.len() > MAX_IMAGE_BYTES {
        errors.push("file", "File is too large. Maximum size is 5 MB.");
    }
}

pub fn validate_login(req: &LoginRequest) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    check_email(&mut errors, &req.email);
    check_password_strength(&mut errors, &req.password, 6);
    errors.into_result()
}

pub fn validate_signup(req: &SignupRequest, confirm_password: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    check_name(&mut errors, "first_name", "First name", &req.first_name, 2);
    check_name(&mut errors, "last_name", "Last name", &req.last_name, 1);
    check_email(&mut errors, &req.email);
    check_password_strength(&mut errors, &req.password, 8);
    if req.password.chars().count() > 32 {
        errors.push("password", "Maximum 32 characters");
    }
    if confirm_password != req.password {
        errors.push("confirm_password", "Passwords do not match");
    }
    errors.into_result()
}

pub fn validate_post(form: &PostForm) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    let title_len = form.title.trim().chars().count();
    if title_len == 0 {
        errors.push("title", "Please enter blog title");
    } else if title_len < 5 {
        errors.push("title", "Title must be at least 5 characters");
    } else if title_len > 200 {
        errors.push("title", "Title cannot exceed 200 characters");
    }
    if form.content.trim().is_empty() {
        errors.push("content", "Please enter content");
    }
    if let Some(image) = &form.image {
        check_image(&mut errors, image);
    }
    errors.into_result()
}

/// `has_existing_image` is true when the stored profile already has a picture.
pub fn validate_profile(form: &ProfileForm, has_existing_image: bool) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    check_name(&mut errors, "first_name", "First name", &form.first_name, 2);
    check_name(&mut errors, "last_name", "Last name", &form.last_name, 1);
    match &form.image {
        Some(image) => check_image(&mut errors, image),
        None if !has_existing_image => errors.push("file", "Profile image is required"),
        None => {}
    }
    errors.into_result()
}

pub fn validate_comment(content: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    if content.trim().is_empty() {
        errors.push("content", "Comment cannot be empty");
    }
    errors.into_result()
}

pub fn validate_todo(todo: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    if todo.trim().is_empty() {
        errors.push("todo", "Please enter todo name");
    }
    errors.into_result()
}
