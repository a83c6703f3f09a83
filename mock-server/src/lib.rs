use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};

const DEFAULT_PER_PAGE: usize = 10;
const MAX_PER_PAGE: usize = 100;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sortable_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sis_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Login {
    pub id: u64,
    pub account_id: u64,
    pub user_id: u64,
    pub unique_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sis_user_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PageView {
    pub id: String,
    pub url: String,
    pub http_method: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub user_id: u64,
}

#[derive(Clone, Debug)]
pub struct Course {
    pub id: u64,
    pub sis_course_id: Option<String>,
    /// `(user_id, enrollment type)` in roster order.
    pub roster: Vec<(u64, String)>,
}

/// In-memory Canvas data behind the mock endpoints.
#[derive(Debug, Default)]
pub struct MockState {
    /// When set, requests must carry `Authorization: Bearer {token}`.
    pub token: Option<String>,
    pub accounts: Vec<u64>,
    pub users: Vec<User>,
    pub logins: Vec<Login>,
    pub courses: Vec<Course>,
    pub page_views: Vec<PageView>,
    next_id: u64,
}

impl MockState {
    pub fn new() -> Self {
        Self {
            next_id: 1000,
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn add_account(&mut self, account_id: u64) {
        self.accounts.push(account_id);
    }

    /// Store `user` under a fresh id and return that id. A `login_id` also
    /// creates a login in the first account.
    pub fn add_user(&mut self, mut user: User) -> u64 {
        user.id = self.allocate_id();
        if let Some(unique_id) = user.login_id.clone() {
            let login = Login {
                id: self.allocate_id(),
                account_id: self.accounts.first().copied().unwrap_or(1),
                user_id: user.id,
                unique_id,
                sis_user_id: user.sis_user_id.clone(),
            };
            self.logins.push(login);
        }
        let id = user.id;
        self.users.push(user);
        id
    }

    pub fn add_course(&mut self, sis_course_id: Option<&str>) -> u64 {
        let id = self.allocate_id();
        self.courses.push(Course {
            id,
            sis_course_id: sis_course_id.map(str::to_string),
            roster: Vec::new(),
        });
        id
    }

    pub fn enroll(&mut self, course_id: u64, user_id: u64, enrollment_type: &str) {
        if let Some(course) = self.courses.iter_mut().find(|c| c.id == course_id) {
            course.roster.push((user_id, enrollment_type.to_string()));
        }
    }

    pub fn add_page_view(&mut self, user_id: u64, url: &str, created_at: DateTime<Utc>) {
        let id = format!("pv-{}", self.allocate_id());
        self.page_views.push(PageView {
            id,
            url: url.to_string(),
            http_method: "get".to_string(),
            created_at,
            user_id,
        });
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn user_id(&self, raw: &str) -> Option<u64> {
        if let Some(sis) = raw.strip_prefix("sis_user_id:") {
            return self
                .users
                .iter()
                .find(|u| u.sis_user_id.as_deref() == Some(sis))
                .map(|u| u.id);
        }
        if let Some(unique_id) = raw.strip_prefix("sis_login_id:") {
            return self
                .logins
                .iter()
                .find(|l| l.unique_id == unique_id)
                .map(|l| l.user_id);
        }
        let id = raw.parse::<u64>().ok()?;
        self.users.iter().any(|u| u.id == id).then_some(id)
    }

    fn course(&self, raw: &str) -> Option<&Course> {
        match raw.strip_prefix("sis_course_id:") {
            Some(sis) => self
                .courses
                .iter()
                .find(|c| c.sis_course_id.as_deref() == Some(sis)),
            None => {
                let id = raw.parse::<u64>().ok()?;
                self.courses.iter().find(|c| c.id == id)
            }
        }
    }

    fn enrollments_for(&self, user_id: u64) -> Vec<Value> {
        self.courses
            .iter()
            .flat_map(|course| {
                course
                    .roster
                    .iter()
                    .enumerate()
                    .filter(move |(_, (uid, _))| *uid == user_id)
                    .map(move |(position, (uid, kind))| {
                        json!({
                            "id": course.id * 1000 + position as u64,
                            "course_id": course.id,
                            "user_id": uid,
                            "type": kind,
                            "enrollment_state": "active",
                            "sis_course_id": course.sis_course_id,
                        })
                    })
            })
            .collect()
    }
}

pub type Db = Arc<RwLock<MockState>>;

type Params = Vec<(String, String)>;

type ApiResult = Result<Response, (StatusCode, Json<Value>)>;

pub fn app() -> Router {
    app_with(MockState::new())
}

pub fn app_with(state: MockState) -> Router {
    let db: Db = Arc::new(RwLock::new(state));
    Router::new()
        .route("/api/v1/users/{user_id}/profile", get(get_profile))
        .route("/api/v1/users/{user_id}/logins", get(list_logins))
        .route("/api/v1/users/{user_id}/page_views", get(list_page_views))
        .route("/api/v1/courses/{course_id}/users", get(list_course_users))
        .route("/api/v1/accounts/{account_id}/users", post(create_user))
        .route("/api/v1/accounts/{account_id}/logins/{login_id}", put(update_login))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with(listener, MockState::new()).await
}

pub async fn run_with(listener: TcpListener, state: MockState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(state)).await
}

fn failure(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({"errors": [{"message": message}]})))
}

fn not_found() -> (StatusCode, Json<Value>) {
    failure(StatusCode::NOT_FOUND, "The specified resource does not exist.")
}

fn authorize(state: &MockState, headers: &HeaderMap) -> Result<(), (StatusCode, Json<Value>)> {
    let Some(token) = &state.token else {
        return Ok(());
    };
    let expected = format!("Bearer {token}");
    match headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some(given) if given == expected => Ok(()),
        _ => Err(failure(StatusCode::UNAUTHORIZED, "Invalid access token.")),
    }
}

/// Serve one page of `items`, adding a `Link: rel="next"` header when more
/// pages remain.
fn paginate<T: Serialize>(items: &[T], params: &Params, uri: &Uri, headers: &HeaderMap) -> Response {
    let lookup = |key: &str| {
        params
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.parse::<usize>().ok())
    };
    let per_page = lookup("per_page")
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_PER_PAGE)
        .min(MAX_PER_PAGE);
    let page = lookup("page").filter(|n| *n > 0).unwrap_or(1);

    let start = (page - 1).saturating_mul(per_page).min(items.len());
    let end = start.saturating_add(per_page).min(items.len());
    let mut response = Json(&items[start..end]).into_response();

    if end < items.len() {
        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("localhost");
        let mut next_params: Params = params
            .iter()
            .filter(|(k, _)| k != "page" && k != "per_page")
            .cloned()
            .collect();
        next_params.push(("page".to_string(), (page + 1).to_string()));
        next_params.push(("per_page".to_string(), per_page.to_string()));
        let query = serde_urlencoded::to_string(&next_params).unwrap_or_default();
        let link = format!("<http://{host}{}?{query}>; rel=\"next\"", uri.path());
        if let Ok(value) = HeaderValue::from_str(&link) {
            response.headers_mut().insert(header::LINK, value);
        }
    }
    response
}

async fn get_profile(
    State(db): State<Db>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult {
    let state = db.read().await;
    authorize(&state, &headers)?;
    let id = state.user_id(&user_id).ok_or_else(not_found)?;
    let user = state.users.iter().find(|u| u.id == id).ok_or_else(not_found)?;
    Ok(Json(user).into_response())
}

async fn list_course_users(
    State(db): State<Db>,
    Path(course_id): Path<String>,
    Query(params): Query<Params>,
    uri: Uri,
    headers: HeaderMap,
) -> ApiResult {
    let state = db.read().await;
    authorize(&state, &headers)?;
    let course = state.course(&course_id).ok_or_else(not_found)?;
    let with_enrollments = params
        .iter()
        .any(|(k, v)| k == "include[]" && v == "enrollments");

    let mut seen = Vec::new();
    let mut users = Vec::new();
    for (user_id, _) in &course.roster {
        if seen.contains(user_id) {
            continue;
        }
        seen.push(*user_id);
        let Some(user) = state.users.iter().find(|u| u.id == *user_id) else {
            continue;
        };
        let mut value = serde_json::to_value(user)
            .map_err(|e| failure(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;
        if with_enrollments {
            value["enrollments"] = Value::Array(state.enrollments_for(*user_id));
        }
        users.push(value);
    }
    Ok(paginate(&users, &params, &uri, &headers))
}

#[derive(Deserialize)]
pub struct CreateUser {
    pub user: NewUser,
    pub pseudonym: NewPseudonym,
    pub communication_channel: Option<NewChannel>,
}

#[derive(Deserialize)]
pub struct NewUser {
    pub name: String,
    pub short_name: Option<String>,
    pub sortable_name: Option<String>,
    pub time_zone: Option<String>,
    pub locale: Option<String>,
}

#[derive(Deserialize)]
pub struct NewPseudonym {
    pub unique_id: Option<String>,
    pub sis_user_id: Option<String>,
    #[serde(default)]
    pub send_confirmation: bool,
}

#[derive(Deserialize)]
pub struct NewChannel {
    #[serde(rename = "type")]
    pub kind: String,
    pub address: String,
}

async fn create_user(
    State(db): State<Db>,
    Path(account_id): Path<u64>,
    headers: HeaderMap,
    Json(input): Json<CreateUser>,
) -> ApiResult {
    let mut state = db.write().await;
    authorize(&state, &headers)?;
    if !state.accounts.contains(&account_id) {
        return Err(not_found());
    }
    let unique_id = input
        .pseudonym
        .unique_id
        .ok_or_else(|| failure(StatusCode::BAD_REQUEST, "pseudonym[unique_id] is required"))?;
    if state.logins.iter().any(|l| l.unique_id == unique_id) {
        return Err(failure(StatusCode::BAD_REQUEST, "ID already in use for this account"));
    }

    let email = input
        .communication_channel
        .filter(|c| c.kind == "email")
        .map(|c| c.address);
    let user = User {
        id: 0,
        name: input.user.name,
        short_name: input.user.short_name,
        sortable_name: input.user.sortable_name,
        login_id: None,
        sis_user_id: input.pseudonym.sis_user_id.clone(),
        email,
        time_zone: input.user.time_zone,
        locale: input.user.locale,
        avatar_url: None,
    };
    let user_id = state.add_user(user);
    let login_id = state.allocate_id();
    state.logins.push(Login {
        id: login_id,
        account_id,
        user_id,
        unique_id: unique_id.clone(),
        sis_user_id: input.pseudonym.sis_user_id,
    });

    let user = state
        .users
        .iter_mut()
        .find(|u| u.id == user_id)
        .ok_or_else(not_found)?;
    user.login_id = Some(unique_id);
    tracing::info!(user_id, account_id, "created user");
    Ok(Json(user.clone()).into_response())
}

async fn list_logins(
    State(db): State<Db>,
    Path(user_id): Path<String>,
    Query(params): Query<Params>,
    uri: Uri,
    headers: HeaderMap,
) -> ApiResult {
    let state = db.read().await;
    authorize(&state, &headers)?;
    let id = state.user_id(&user_id).ok_or_else(not_found)?;
    let logins: Vec<&Login> = state.logins.iter().filter(|l| l.user_id == id).collect();
    Ok(paginate(&logins, &params, &uri, &headers))
}

#[derive(Deserialize)]
pub struct UpdateLogin {
    pub login: LoginChanges,
}

#[derive(Deserialize)]
pub struct LoginChanges {
    pub unique_id: Option<String>,
    pub sis_user_id: Option<String>,
}

async fn update_login(
    State(db): State<Db>,
    Path((account_id, login_id)): Path<(u64, u64)>,
    headers: HeaderMap,
    Json(input): Json<UpdateLogin>,
) -> ApiResult {
    let mut state = db.write().await;
    authorize(&state, &headers)?;
    let login = state
        .logins
        .iter_mut()
        .find(|l| l.id == login_id && l.account_id == account_id)
        .ok_or_else(not_found)?;
    if let Some(unique_id) = input.login.unique_id {
        login.unique_id = unique_id;
    }
    if let Some(sis_user_id) = input.login.sis_user_id {
        login.sis_user_id = Some(sis_user_id);
    }
    Ok(Json(login.clone()).into_response())
}

async fn list_page_views(
    State(db): State<Db>,
    Path(user_id): Path<String>,
    Query(params): Query<Params>,
    uri: Uri,
    headers: HeaderMap,
) -> ApiResult {
    let state = db.read().await;
    authorize(&state, &headers)?;
    let id = state.user_id(&user_id).ok_or_else(not_found)?;

    let bound = |key: &str| -> Result<Option<DateTime<Utc>>, (StatusCode, Json<Value>)> {
        match params.iter().find(|(k, _)| k == key) {
            None => Ok(None),
            Some((_, raw)) => DateTime::parse_from_rfc3339(raw)
                .map(|t| Some(t.with_timezone(&Utc)))
                .map_err(|_| failure(StatusCode::BAD_REQUEST, &format!("invalid {key}"))),
        }
    };
    let start = bound("start_time")?;
    let end = bound("end_time")?;

    let mut views: Vec<&PageView> = state
        .page_views
        .iter()
        .filter(|v| v.user_id == id)
        .filter(|v| start.map_or(true, |s| v.created_at >= s))
        .filter(|v| end.map_or(true, |e| v.created_at < e))
        .collect();
    views.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(paginate(&views, &params, &uri, &headers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_skips_absent_fields() {
        let user = User {
            id: 7,
            name: "Test".to_string(),
            ..User::default()
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json, json!({"id": 7, "name": "Test"}));
    }

    #[test]
    fn add_user_with_login_id_creates_login() {
        let mut state = MockState::new();
        state.add_account(5);
        let id = state.add_user(User {
            name: "A".to_string(),
            login_id: Some("a1".to_string()),
            sis_user_id: Some("SIS-A".to_string()),
            ..User::default()
        });
        assert_eq!(state.logins.len(), 1);
        assert_eq!(state.logins[0].user_id, id);
        assert_eq!(state.logins[0].account_id, 5);
        assert_eq!(state.user_id("sis_user_id:SIS-A"), Some(id));
        assert_eq!(state.user_id("sis_login_id:a1"), Some(id));
        assert_eq!(state.user_id(&id.to_string()), Some(id));
        assert_eq!(state.user_id("999999"), None);
    }

    #[test]
    fn course_lookup_by_sis_id() {
        let mut state = MockState::new();
        let id = state.add_course(Some("2024-spring-A"));
        assert_eq!(state.course("sis_course_id:2024-spring-A").map(|c| c.id), Some(id));
        assert_eq!(state.course(&id.to_string()).map(|c| c.id), Some(id));
        assert!(state.course("sis_course_id:nope").is_none());
    }

    #[test]
    fn page_view_serializes_without_owner() {
        let view = PageView {
            id: "pv-1".to_string(),
            url: "/courses/1".to_string(),
            http_method: "get".to_string(),
            created_at: DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            user_id: 9,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("user_id").is_none());
        assert_eq!(json["created_at"], "2024-01-01T00:00:00Z");
    }

    #[test]
    fn create_user_body_accepts_missing_channel() {
        let input: CreateUser = serde_json::from_str(
            r#"{"user":{"name":"N"},"pseudonym":{"unique_id":"n","send_confirmation":false}}"#,
        )
        .unwrap();
        assert!(input.communication_channel.is_none());
        assert_eq!(input.pseudonym.unique_id.as_deref(), Some("n"));
    }
}
