//! Canvas records and their JSON mappings.
//!
//! # Design
//! Each record has a `from_json` constructor that first checks the keys the
//! record cannot exist without, reporting the first absent one as
//! `ApiError::MissingField`, and then deserializes through an explicit serde
//! schema. Optional keys become `None` when absent or null; keys the schema
//! does not name are ignored.
//!
//! Request bodies go the other way: `User::post_data` and `Login::put_data`
//! build the nested objects the create and update endpoints expect, leaving
//! out optional values that are not set.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

/// A raw page-view record, returned as Canvas sent it.
pub type PageView = Value;

/// A Canvas user as returned by the profile and roster endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub short_name: Option<String>,
    pub sortable_name: Option<String>,
    pub login_id: Option<String>,
    pub sis_user_id: Option<String>,
    pub email: Option<String>,
    pub time_zone: Option<String>,
    pub locale: Option<String>,
    pub avatar_url: Option<String>,
    /// Present only when the response carried an `enrollments` array.
    pub enrollments: Option<Vec<Enrollment>>,
}

#[derive(Deserialize)]
struct UserJson {
    id: u64,
    name: String,
    short_name: Option<String>,
    sortable_name: Option<String>,
    login_id: Option<String>,
    sis_user_id: Option<String>,
    email: Option<String>,
    time_zone: Option<String>,
    locale: Option<String>,
    avatar_url: Option<String>,
    enrollments: Option<Vec<Value>>,
}

impl User {
    const REQUIRED: &'static [&'static str] = &["id", "name"];

    pub fn from_json(data: &Value) -> Result<Self, ApiError> {
        require_fields(data, Self::REQUIRED)?;
        let wire: UserJson = deserialize(data)?;
        let enrollments = wire
            .enrollments
            .map(|items| items.iter().map(Enrollment::from_json).collect::<Result<Vec<_>, _>>())
            .transpose()?;

        Ok(User {
            id: wire.id,
            name: wire.name,
            short_name: wire.short_name,
            sortable_name: wire.sortable_name,
            login_id: wire.login_id,
            sis_user_id: wire.sis_user_id,
            email: wire.email,
            time_zone: wire.time_zone,
            locale: wire.locale,
            avatar_url: wire.avatar_url,
            enrollments,
        })
    }

    /// Body for `POST /api/v1/accounts/{account_id}/users`.
    ///
    /// `login_id` becomes the pseudonym's `unique_id`. The email
    /// communication channel is only sent when the user has an email.
    pub fn post_data(&self) -> Result<Value, ApiError> {
        let body = CreateUserBody {
            user: NewUserFields {
                name: &self.name,
                short_name: self.short_name.as_deref(),
                sortable_name: self.sortable_name.as_deref(),
                time_zone: self.time_zone.as_deref(),
                locale: self.locale.as_deref(),
            },
            pseudonym: NewPseudonym {
                unique_id: self.login_id.as_deref(),
                sis_user_id: self.sis_user_id.as_deref(),
                send_confirmation: false,
            },
            communication_channel: self.email.as_deref().map(|address| CommunicationChannel {
                kind: "email",
                address,
                skip_confirmation: true,
            }),
        };
        to_json(&body)
    }
}

#[derive(Serialize)]
struct CreateUserBody<'a> {
    user: NewUserFields<'a>,
    pseudonym: NewPseudonym<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    communication_channel: Option<CommunicationChannel<'a>>,
}

#[derive(Serialize)]
struct NewUserFields<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    short_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sortable_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_zone: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    locale: Option<&'a str>,
}

#[derive(Serialize)]
struct NewPseudonym<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    unique_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sis_user_id: Option<&'a str>,
    send_confirmation: bool,
}

#[derive(Serialize)]
struct CommunicationChannel<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    address: &'a str,
    skip_confirmation: bool,
}

/// A login (pseudonym) attached to a user within an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Login {
    pub id: u64,
    pub account_id: u64,
    pub sis_user_id: Option<String>,
    pub unique_id: String,
    pub user_id: u64,
}

impl Login {
    const REQUIRED: &'static [&'static str] = &["id", "account_id", "unique_id", "user_id"];

    pub fn from_json(data: &Value) -> Result<Self, ApiError> {
        require_fields(data, Self::REQUIRED)?;
        deserialize(data)
    }

    /// Body for `PUT /api/v1/accounts/{account_id}/logins/{id}`.
    pub fn put_data(&self) -> Result<Value, ApiError> {
        to_json(&UpdateLoginBody {
            login: UpdateLoginFields {
                unique_id: &self.unique_id,
                sis_user_id: self.sis_user_id.as_deref(),
            },
        })
    }
}

#[derive(Serialize)]
struct UpdateLoginBody<'a> {
    login: UpdateLoginFields<'a>,
}

#[derive(Serialize)]
struct UpdateLoginFields<'a> {
    unique_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sis_user_id: Option<&'a str>,
}

/// A user's enrollment in a course section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: u64,
    pub course_id: Option<u64>,
    pub course_section_id: Option<u64>,
    pub user_id: Option<u64>,
    /// Base enrollment type, e.g. `StudentEnrollment`.
    #[serde(rename = "type")]
    pub enrollment_type: Option<String>,
    pub role: Option<String>,
    pub enrollment_state: Option<String>,
    pub sis_course_id: Option<String>,
    pub sis_section_id: Option<String>,
    pub sis_user_id: Option<String>,
    pub html_url: Option<String>,
    pub last_activity_at: Option<DateTime<Utc>>,
    /// Seconds of recorded activity in the course.
    pub total_activity_time: Option<u64>,
    pub grades: Option<Grades>,
}

impl Enrollment {
    const REQUIRED: &'static [&'static str] = &["id"];

    pub fn from_json(data: &Value) -> Result<Self, ApiError> {
        require_fields(data, Self::REQUIRED)?;
        deserialize(data)
    }
}

/// Grade summary carried on student enrollments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grades {
    pub current_score: Option<f64>,
    pub final_score: Option<f64>,
    pub current_grade: Option<String>,
    pub final_grade: Option<String>,
}

/// Fail with `MissingField` for the first of `fields` absent from `data`.
fn require_fields(data: &Value, fields: &[&'static str]) -> Result<(), ApiError> {
    let object = data.as_object().ok_or_else(|| {
        ApiError::Deserialization(format!("expected a JSON object, got {data}"))
    })?;
    match fields.iter().find(|field| !object.contains_key(**field)) {
        Some(field) => Err(ApiError::MissingField { field: *field }),
        None => Ok(()),
    }
}

fn deserialize<T: DeserializeOwned>(data: &Value) -> Result<T, ApiError> {
    T::deserialize(data).map_err(|e| ApiError::Deserialization(e.to_string()))
}

fn to_json<T: Serialize>(body: &T) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn user_with_only_required_fields() {
        let user = User::from_json(&json!({"id": 188893, "name": "J. Doe"})).unwrap();
        assert_eq!(user.id, 188893);
        assert_eq!(user.name, "J. Doe");
        assert_eq!(user.short_name, None);
        assert_eq!(user.sortable_name, None);
        assert_eq!(user.login_id, None);
        assert_eq!(user.sis_user_id, None);
        assert_eq!(user.email, None);
        assert_eq!(user.time_zone, None);
        assert_eq!(user.locale, None);
        assert_eq!(user.avatar_url, None);
        assert_eq!(user.enrollments, None);
    }

    #[test]
    fn user_copies_present_optional_fields() {
        let user = User::from_json(&json!({
            "id": 188893,
            "name": "J. Doe",
            "short_name": "J",
            "sortable_name": "Doe, J.",
            "login_id": "jdoe",
            "sis_user_id": "DB3E75D3A9F711D7C5ECAB4D67A9B3E5",
            "primary_email": "ignored@example.edu",
            "email": "jdoe@example.edu",
            "time_zone": "America/Los_Angeles",
            "locale": "en",
            "avatar_url": "https://canvas.test/images/thumbnails/1/x"
        }))
        .unwrap();
        assert_eq!(user.short_name.as_deref(), Some("J"));
        assert_eq!(user.sortable_name.as_deref(), Some("Doe, J."));
        assert_eq!(user.login_id.as_deref(), Some("jdoe"));
        assert_eq!(user.sis_user_id.as_deref(), Some("DB3E75D3A9F711D7C5ECAB4D67A9B3E5"));
        assert_eq!(user.email.as_deref(), Some("jdoe@example.edu"));
        assert_eq!(user.time_zone.as_deref(), Some("America/Los_Angeles"));
        assert_eq!(user.locale.as_deref(), Some("en"));
        assert!(user.avatar_url.is_some());
    }

    #[test]
    fn user_null_optional_reads_as_absent() {
        let user = User::from_json(&json!({"id": 1, "name": "N", "locale": null})).unwrap();
        assert_eq!(user.locale, None);
    }

    #[test]
    fn user_missing_required_field() {
        let err = User::from_json(&json!({"id": 1})).unwrap_err();
        assert!(matches!(err, ApiError::MissingField { field: "name" }));

        let err = User::from_json(&json!({"name": "N"})).unwrap_err();
        assert!(matches!(err, ApiError::MissingField { field: "id" }));
    }

    #[test]
    fn user_wrong_type_is_deserialization_error() {
        let err = User::from_json(&json!({"id": "abc", "name": "N"})).unwrap_err();
        assert!(matches!(err, ApiError::Deserialization(_)));

        let err = User::from_json(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, ApiError::Deserialization(_)));
    }

    #[test]
    fn user_enrollments_keep_order() {
        let user = User::from_json(&json!({
            "id": 1,
            "name": "N",
            "enrollments": [
                {"id": 30, "course_id": 3, "type": "StudentEnrollment"},
                {"id": 10, "course_id": 1, "type": "TeacherEnrollment"},
                {"id": 20, "course_id": 2}
            ]
        }))
        .unwrap();
        let enrollments = user.enrollments.unwrap();
        let ids: Vec<u64> = enrollments.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![30, 10, 20]);
        assert_eq!(enrollments[0].enrollment_type.as_deref(), Some("StudentEnrollment"));
        assert_eq!(enrollments[2].enrollment_type, None);
    }

    #[test]
    fn user_empty_enrollments_is_some_empty() {
        let user = User::from_json(&json!({"id": 1, "name": "N", "enrollments": []})).unwrap();
        assert_eq!(user.enrollments, Some(Vec::new()));
    }

    #[test]
    fn enrollment_missing_id_fails_the_user() {
        let err = User::from_json(&json!({"id": 1, "name": "N", "enrollments": [{"course_id": 3}]}))
            .unwrap_err();
        assert!(matches!(err, ApiError::MissingField { field: "id" }));
    }

    #[test]
    fn enrollment_parses_grades_and_activity() {
        let enrollment = Enrollment::from_json(&json!({
            "id": 7,
            "course_id": 2,
            "course_section_id": 4,
            "user_id": 9,
            "role": "StudentEnrollment",
            "enrollment_state": "active",
            "last_activity_at": "2012-04-18T23:08:51Z",
            "total_activity_time": 260,
            "grades": {"current_score": 91.5, "final_score": 80.0, "current_grade": "A-", "final_grade": null}
        }))
        .unwrap();
        assert_eq!(enrollment.enrollment_state.as_deref(), Some("active"));
        assert_eq!(enrollment.total_activity_time, Some(260));
        assert_eq!(
            enrollment.last_activity_at.unwrap().to_rfc3339(),
            "2012-04-18T23:08:51+00:00"
        );
        let grades = enrollment.grades.unwrap();
        assert_eq!(grades.current_score, Some(91.5));
        assert_eq!(grades.final_grade, None);
    }

    #[test]
    fn login_round_trips_required_fields() {
        let login = Login::from_json(&json!({
            "id": 100,
            "account_id": 2,
            "unique_id": "jdoe",
            "user_id": 188893,
            "sis_user_id": "SIS-1",
            "authentication_provider_id": null
        }))
        .unwrap();
        assert_eq!(
            login,
            Login {
                id: 100,
                account_id: 2,
                sis_user_id: Some("SIS-1".to_string()),
                unique_id: "jdoe".to_string(),
                user_id: 188893,
            }
        );
    }

    #[test]
    fn login_without_sis_id() {
        let login = Login::from_json(&json!({"id": 1, "account_id": 2, "unique_id": "u", "user_id": 3}))
            .unwrap();
        assert_eq!(login.sis_user_id, None);
    }

    #[test]
    fn login_missing_required_field() {
        for field in ["id", "account_id", "unique_id", "user_id"] {
            let mut data = json!({"id": 1, "account_id": 2, "unique_id": "u", "user_id": 3});
            data.as_object_mut().unwrap().remove(field);
            let err = Login::from_json(&data).unwrap_err();
            assert!(
                matches!(err, ApiError::MissingField { field: f } if f == field),
                "{field}"
            );
        }
    }

    #[test]
    fn post_data_nests_user_pseudonym_and_channel() {
        let user = User {
            name: "Jane Doe".to_string(),
            short_name: Some("Jane".to_string()),
            login_id: Some("jdoe".to_string()),
            sis_user_id: Some("SIS-9".to_string()),
            email: Some("jdoe@example.edu".to_string()),
            ..User::default()
        };
        assert_eq!(
            user.post_data().unwrap(),
            json!({
                "user": {"name": "Jane Doe", "short_name": "Jane"},
                "pseudonym": {"unique_id": "jdoe", "sis_user_id": "SIS-9", "send_confirmation": false},
                "communication_channel": {
                    "type": "email",
                    "address": "jdoe@example.edu",
                    "skip_confirmation": true
                }
            })
        );
    }

    #[test]
    fn post_data_without_email_omits_channel() {
        let user = User {
            name: "N".to_string(),
            ..User::default()
        };
        let body = user.post_data().unwrap();
        assert!(body.get("communication_channel").is_none());
        assert_eq!(body["pseudonym"], json!({"send_confirmation": false}));
    }

    #[test]
    fn put_data_carries_login_fields() {
        let login = Login {
            id: 5,
            account_id: 1,
            sis_user_id: None,
            unique_id: "new-id".to_string(),
            user_id: 9,
        };
        assert_eq!(login.put_data().unwrap(), json!({"login": {"unique_id": "new-id"}}));
    }
}
