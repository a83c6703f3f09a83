//! User, login and page-view operations.
//!
//! # Design
//! `UserService` owns a `ResourceClient` and an optional default account id,
//! and nothing else. Every operation is one fetch, paginated fetch, create or
//! update, followed by a field-by-field mapping into records. The `*_by_sis_*`
//! variants only resolve their identifier and delegate.

use std::fmt;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::CanvasConfig;
use crate::error::ApiError;
use crate::resource::{CanvasClient, Params, ResourceClient};
use crate::sis::SisField;
use crate::types::{Login, PageView, User};

/// Canvas users API.
#[derive(Clone)]
pub struct UserService<C> {
    client: C,
    default_account_id: Option<String>,
}

impl UserService<CanvasClient> {
    /// HTTP-backed service using the config's account id as the default.
    pub fn from_config(config: CanvasConfig) -> Self {
        let default_account_id = config.account_id.clone();
        Self::new(CanvasClient::from_config(config), default_account_id)
    }
}

impl<C: ResourceClient> UserService<C> {
    pub fn new(client: C, default_account_id: Option<String>) -> Self {
        Self {
            client,
            default_account_id,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Profile for a Canvas user id (or an already-resolved SIS reference).
    pub fn get_user(&self, user_id: impl fmt::Display) -> Result<User, ApiError> {
        let url = format!("/api/v1/users/{user_id}/profile");
        User::from_json(&self.client.get(&url, &[])?)
    }

    pub fn get_user_by_sis_id(&self, sis_user_id: &str) -> Result<User, ApiError> {
        self.get_user(self.client.resolve_sis_id(sis_user_id, SisField::User))
    }

    /// Every user in a course roster, across all pages.
    pub fn get_users_for_course(&self, course_id: impl fmt::Display, params: &Params) -> Result<Vec<User>, ApiError> {
        let url = format!("/api/v1/courses/{course_id}/users");
        self.client
            .get_paged(&url, params)?
            .iter()
            .map(User::from_json)
            .collect()
    }

    pub fn get_users_for_sis_course_id(&self, sis_course_id: &str, params: &Params) -> Result<Vec<User>, ApiError> {
        self.get_users_for_course(self.client.resolve_sis_id(sis_course_id, SisField::Course), params)
    }

    /// Create a user and its login under `account_id`, or under the default
    /// account when `None`.
    pub fn create_user(&self, user: &User, account_id: Option<&str>) -> Result<User, ApiError> {
        let account_id = self.account_id(account_id)?;
        let url = format!("/api/v1/accounts/{account_id}/users");
        debug!(account_id, name = %user.name, "creating user");
        User::from_json(&self.client.post(&url, &user.post_data()?)?)
    }

    pub fn get_user_logins(&self, user_id: impl fmt::Display, params: &Params) -> Result<Vec<Login>, ApiError> {
        let url = format!("/api/v1/users/{user_id}/logins");
        self.client
            .get_paged(&url, params)?
            .iter()
            .map(Login::from_json)
            .collect()
    }

    pub fn get_user_logins_by_sis_id(&self, sis_user_id: &str) -> Result<Vec<Login>, ApiError> {
        self.get_user_logins(self.client.resolve_sis_id(sis_user_id, SisField::User), &[])
    }

    /// Write `login`'s unique id and SIS id back to Canvas.
    pub fn update_user_login(&self, login: &Login, account_id: Option<&str>) -> Result<Login, ApiError> {
        let account_id = self.account_id(account_id)?;
        let url = format!("/api/v1/accounts/{account_id}/logins/{}", login.id);
        debug!(account_id, login_id = login.id, "updating login");
        Login::from_json(&self.client.put(&url, &login.put_data()?)?)
    }

    /// Page views for a user, optionally bounded by `start_time` and
    /// `end_time`. Records are returned as Canvas sent them.
    pub fn get_user_page_views(
        &self,
        user_id: impl fmt::Display,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<PageView>, ApiError> {
        let url = format!("/api/v1/users/{user_id}/page_views");
        self.client.get_paged(&url, &page_view_params(start_time, end_time))
    }

    pub fn get_user_page_views_by_sis_login_id(
        &self,
        sis_login_id: &str,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<PageView>, ApiError> {
        self.get_user_page_views(
            self.client.resolve_sis_id(sis_login_id, SisField::Login),
            start_time,
            end_time,
        )
    }

    fn account_id<'a>(&'a self, account_id: Option<&'a str>) -> Result<&'a str, ApiError> {
        account_id
            .or(self.default_account_id.as_deref())
            .ok_or(ApiError::MissingAccountId)
    }
}

fn page_view_params(start_time: Option<DateTime<Utc>>, end_time: Option<DateTime<Utc>>) -> Vec<(String, String)> {
    [("start_time", start_time), ("end_time", end_time)]
        .into_iter()
        .filter_map(|(key, time)| time.map(|t| (key.to_string(), t.to_rfc3339())))
        .collect()
}
