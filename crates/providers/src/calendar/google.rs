//! Google Calendar adapter and API client.
//!
//! The adapter normalizes `Events.list` items; the client wraps the v3 REST
//! API for delta listing and watch channels. OAuth acquisition happens
//! elsewhere; the client only consumes an access token per closer.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use cs_domain::error::{Error, Result};
use cs_domain::event::{Attendee, CalendarEventType, CanonicalCalendarEvent};
use cs_domain::tenant::Closer;

use crate::util::{from_reqwest, key_from_env};

use super::{CalendarAdapter, CalendarApi, WatchChannel};

const GOOGLE_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct GoogleCalendarAdapter;

fn str_field<'a>(raw: &'a Value, key: &str) -> Option<&'a str> {
    raw.get(key).and_then(Value::as_str)
}

/// Google nests times as `{"dateTime": ..., "timeZone": ...}` (or `date`
/// for all-day events).
fn time_field(raw: &Value, key: &str) -> Option<String> {
    let node = raw.get(key)?;
    node.get("dateTime")
        .or_else(|| node.get("date"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

impl CalendarAdapter for GoogleCalendarAdapter {
    fn provider_key(&self) -> &'static str {
        "google"
    }

    fn normalize(&self, raw: &Value) -> Result<CanonicalCalendarEvent> {
        let event_id = str_field(raw, "id")
            .ok_or_else(|| Error::Provider {
                provider: "google".into(),
                message: "event without id".into(),
            })?
            .to_string();

        let status = str_field(raw, "status").unwrap_or("confirmed").to_string();
        let event_type = if status.eq_ignore_ascii_case("cancelled") {
            CalendarEventType::Cancelled
        } else if raw.get("sequence").and_then(Value::as_i64).unwrap_or(0) > 0 {
            CalendarEventType::Updated
        } else {
            CalendarEventType::Confirmed
        };

        let attendees: Vec<Attendee> = raw
            .get("attendees")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|a| {
                        Some(Attendee {
                            email: cs_domain::tenant::normalize_email(
                                a.get("email")?.as_str()?,
                            ),
                            name: a
                                .get("displayName")
                                .and_then(Value::as_str)
                                .map(str::to_string),
                            is_organizer: a
                                .get("organizer")
                                .and_then(Value::as_bool)
                                .unwrap_or(false),
                            response_status: a
                                .get("responseStatus")
                                .and_then(Value::as_str)
                                .map(str::to_string),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let organizer_email = raw
            .get("organizer")
            .and_then(|o| o.get("email"))
            .and_then(Value::as_str)
            .map(cs_domain::tenant::normalize_email)
            .or_else(|| {
                attendees
                    .iter()
                    .find(|a| a.is_organizer)
                    .map(|a| a.email.clone())
            })
            .unwrap_or_default();

        let timezone = raw
            .get("start")
            .and_then(|s| s.get("timeZone"))
            .and_then(Value::as_str)
            .unwrap_or("UTC")
            .to_string();

        Ok(CanonicalCalendarEvent {
            event_id,
            event_type,
            title: str_field(raw, "summary").unwrap_or("").to_string(),
            // Cancelled payloads strip times; an empty start is acceptable
            // there because cancellation bypasses scheduling fields.
            start: time_field(raw, "start").unwrap_or_default(),
            end: time_field(raw, "end"),
            timezone,
            organizer_email,
            declined_attendees: self.extract_declined_attendees(raw),
            attendees,
            status,
            updated: str_field(raw, "updated").map(str::to_string),
        })
    }

    fn extract_declined_attendees(&self, raw: &Value) -> Vec<String> {
        raw.get("attendees")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter(|a| {
                        a.get("responseStatus").and_then(Value::as_str) == Some("declined")
                    })
                    .filter_map(|a| a.get("email").and_then(Value::as_str))
                    .map(cs_domain::tenant::normalize_email)
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// API client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Supplies a calendar access token for a closer. Credential acquisition
/// (OAuth refresh, service accounts) lives outside the core.
pub trait CalendarAuth: Send + Sync {
    fn access_token(&self, closer: &Closer) -> Result<String>;
}

/// Reads one shared token from an environment variable. Suitable for
/// service-account setups where a single delegated token spans closers.
pub struct EnvCalendarAuth {
    pub env_var: String,
}

impl CalendarAuth for EnvCalendarAuth {
    fn access_token(&self, _closer: &Closer) -> Result<String> {
        key_from_env(&self.env_var)
    }
}

pub struct GoogleCalendarClient {
    base_url: String,
    auth: Box<dyn CalendarAuth>,
    client: reqwest::Client,
}

impl GoogleCalendarClient {
    pub fn new(auth: Box<dyn CalendarAuth>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(from_reqwest)?;
        Ok(Self {
            base_url: GOOGLE_API_BASE.to_string(),
            auth,
            client,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn check(resp: reqwest::Response, op: &str) -> Result<Value> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Provider {
                provider: "google".into(),
                message: format!("{op} failed with {status}: {body}"),
            });
        }
        resp.json().await.map_err(from_reqwest)
    }
}

#[async_trait]
impl CalendarApi for GoogleCalendarClient {
    async fn list_changed_events(
        &self,
        closer: &Closer,
        since: DateTime<Utc>,
    ) -> Result<Vec<Value>> {
        let token = self.auth.access_token(closer)?;
        let url = format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencode(&closer.work_email)
        );
        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[
                ("updatedMin", since.to_rfc3339()),
                ("showDeleted", "true".into()),
                ("singleEvents", "true".into()),
                ("maxResults", "250".into()),
            ])
            .send()
            .await
            .map_err(from_reqwest)?;
        let body = Self::check(resp, "list_changed_events").await?;
        Ok(body
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_watch(
        &self,
        closer: &Closer,
        channel_id: &str,
        token: &str,
        callback_url: &str,
    ) -> Result<WatchChannel> {
        let access = self.auth.access_token(closer)?;
        let url = format!(
            "{}/calendars/{}/events/watch",
            self.base_url,
            urlencode(&closer.work_email)
        );
        let resp = self
            .client
            .post(&url)
            .bearer_auth(access)
            .json(&serde_json::json!({
                "id": channel_id,
                "type": "web_hook",
                "address": callback_url,
                "token": token,
            }))
            .send()
            .await
            .map_err(from_reqwest)?;
        let body = Self::check(resp, "create_watch").await?;
        let resource_id = body
            .get("resourceId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        // Expiration arrives as epoch millis in a string.
        let expiry = body
            .get("expiration")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_else(|| Utc::now() + Duration::days(7));
        Ok(WatchChannel {
            channel_id: channel_id.to_string(),
            resource_id,
            expiry,
        })
    }

    async fn stop_watch(&self, channel_id: &str, resource_id: &str) -> Result<()> {
        // Stop is account-independent; a 404 means the channel already
        // expired and counts as success.
        let url = format!("{}/channels/stop", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "id": channel_id,
                "resourceId": resource_id,
            }))
            .send()
            .await
            .map_err(from_reqwest)?;
        if resp.status().is_success() || resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(Error::Provider {
            provider: "google".into(),
            message: format!("stop_watch failed with {status}: {body}"),
        })
    }
}

fn urlencode(s: &str) -> String {
    s.replace('@', "%40")
}
