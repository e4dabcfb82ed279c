use chrono::Utc;

use crate::error::BlogClientError;
use crate::http_client::ResourceClient;
use crate::models::{LoginRequest, ProfileForm, SignupRequest, UserProfile};
use crate::session::Session;
use crate::validation;

/// Login, signup, profile and logout flows. These are the only callers
/// that write the session.
#[derive(Debug, Clone)]
pub struct AuthService {
    client: ResourceClient,
}

impl AuthService {
    pub fn new(client: ResourceClient) -> Self {
        Self { client }
    }

    pub async fn login(&self, req: LoginRequest) -> Result<Session, BlogClientError> {
        validation::validate_login(&req)?;
        tracing::debug!("Login called for {}", req.email);

        let (token, user) = self.client.login(&req).await?;
        self.client.session().sign_in(user, token, Utc::now())
    }

    pub async fn signup(&self, req: SignupRequest, confirm_password: &str) -> Result<Session, BlogClientError> {
        validation::validate_signup(&req, confirm_password)?;
        tracing::debug!("Signup called for {}", req.email);

        let (token, user) = self.client.signup(&req).await?;
        self.client.session().sign_in(user, token, Utc::now())
    }

    /// Re-reads the profile from `GET /user` into the session.
    pub async fn refresh_user(&self) -> Result<UserProfile, BlogClientError> {
        let user = self.client.fetch_user().await?;
        self.client.session().update_user(user, Utc::now())?;
        self.client
            .session()
            .user()
            .ok_or_else(|| BlogClientError::Unauthorized("not signed in".into()))
    }

    pub async fn update_profile(&self, form: ProfileForm) -> Result<UserProfile, BlogClientError> {
        let current = self
            .client
            .session()
            .user()
            .ok_or_else(|| BlogClientError::Unauthorized("not signed in".into()))?;
        validation::validate_profile(&form, current.img_url.is_some())?;

        let user = self.client.update_user(form).await?;
        self.client.session().update_user(user, Utc::now())?;
        self.client
            .session()
            .user()
            .ok_or_else(|| BlogClientError::Unauthorized("not signed in".into()))
    }

    pub fn logout(&self) -> Result<(), BlogClientError> {
        self.client.session().sign_out()
    }
}
