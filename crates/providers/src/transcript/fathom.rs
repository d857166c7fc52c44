//! Fathom adapter and API client.
//!
//! Fathom is the tier-1 transcript provider: webhook delivery, a webhook
//! registration API, and a listing API the sweeper uses for catch-up
//! polling. The webhook payload nests the recorder under `fathom_user`, the
//! invitees under `calendar_invitees`, and the transcript as an utterance
//! array with `HH:MM:SS` timestamps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use cs_domain::error::{Error, Result};
use cs_domain::event::{render_utterance, CanonicalTranscript, SpeakerStats};
use cs_domain::tenant::{normalize_email, Closer};

use crate::util::from_reqwest;

use super::{Normalized, RegisteredWebhook, TranscriptAdapter, TranscriptPullApi};

const FATHOM_API_BASE: &str = "https://api.fathom.ai/external/v1";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct FathomAdapter;

fn str_at<'a>(raw: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut node = raw;
    for key in path {
        node = node.get(key)?;
    }
    node.as_str()
}

/// Parse a `HH:MM:SS` (or `MM:SS`) timestamp into seconds.
fn parse_offset(ts: &str) -> Option<u32> {
    let parts: Vec<&str> = ts.split(':').collect();
    let nums: Vec<u32> = parts.iter().map(|p| p.parse().ok()).collect::<Option<_>>()?;
    match nums.as_slice() {
        [h, m, s] => Some(h * 3600 + m * 60 + s),
        [m, s] => Some(m * 60 + s),
        _ => None,
    }
}

impl FathomAdapter {
    /// Flatten the utterance array and aggregate per-speaker stats.
    fn flatten_transcript(utterances: &[Value]) -> (String, Vec<SpeakerStats>) {
        let mut lines = Vec::with_capacity(utterances.len());
        let mut speakers: Vec<SpeakerStats> = Vec::new();
        for u in utterances {
            let speaker = str_at(u, &["speaker", "display_name"]).unwrap_or("Unknown");
            let text = u.get("text").and_then(Value::as_str).unwrap_or("");
            let offset = u
                .get("timestamp")
                .and_then(Value::as_str)
                .and_then(parse_offset)
                .unwrap_or(0);
            lines.push(render_utterance(offset, speaker, text));

            let words = text.split_whitespace().count() as u32;
            match speakers.iter_mut().find(|s| s.name == speaker) {
                Some(s) => {
                    s.utterances += 1;
                    s.words += words;
                }
                None => speakers.push(SpeakerStats {
                    name: speaker.to_string(),
                    utterances: 1,
                    words,
                }),
            }
        }
        (lines.join("\n"), speakers)
    }

    fn duration_minutes(raw: &Value) -> Option<u32> {
        if let Some(mins) = str_at(raw, &["recording", "duration_in_minutes"])
            .and_then(|s| s.parse::<f64>().ok())
            .or_else(|| {
                raw.get("recording")
                    .and_then(|r| r.get("duration_in_minutes"))
                    .and_then(Value::as_f64)
            })
        {
            return Some(mins.round() as u32);
        }
        let start = str_at(raw, &["recording", "start_time"])?;
        let end = str_at(raw, &["recording", "end_time"])?;
        let start = DateTime::parse_from_rfc3339(start).ok()?;
        let end = DateTime::parse_from_rfc3339(end).ok()?;
        let minutes = (end - start).num_minutes();
        (minutes >= 0).then_some(minutes as u32)
    }
}

impl TranscriptAdapter for FathomAdapter {
    fn provider_key(&self) -> &'static str {
        "fathom"
    }

    fn normalize(&self, raw: &Value) -> Result<Normalized> {
        let meeting_id = raw
            .get("id")
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Provider {
                provider: "fathom".into(),
                message: "payload without meeting id".into(),
            })?;

        // Metadata-first delivery: the transcript key is absent until the
        // recording finishes processing. An empty array is a real (empty)
        // transcript and flows through evaluation.
        let utterances = match raw.get("transcript") {
            Some(Value::Array(list)) => list.as_slice(),
            _ => return Ok(Normalized::MetadataOnly { meeting_id }),
        };

        let closer_email = str_at(raw, &["fathom_user", "email"])
            .map(normalize_email)
            .ok_or_else(|| Error::Provider {
                provider: "fathom".into(),
                message: "payload without recorder email".into(),
            })?;

        let external_invitee = raw
            .get("calendar_invitees")
            .and_then(Value::as_array)
            .and_then(|list| {
                list.iter().find(|i| {
                    let email = i.get("email").and_then(Value::as_str).unwrap_or("");
                    let external = i
                        .get("is_external")
                        .and_then(Value::as_bool)
                        .unwrap_or_else(|| normalize_email(email) != closer_email);
                    external && !email.is_empty()
                })
            });

        let (transcript_text, speakers) = Self::flatten_transcript(utterances);

        Ok(Normalized::Transcript(Box::new(CanonicalTranscript {
            provider: "fathom".into(),
            meeting_id,
            closer_email,
            prospect_email: external_invitee
                .and_then(|i| i.get("email"))
                .and_then(Value::as_str)
                .map(normalize_email),
            prospect_name: external_invitee
                .and_then(|i| i.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string),
            title: str_at(raw, &["title"])
                .or_else(|| str_at(raw, &["meeting", "title"]))
                .map(str::to_string),
            summary: str_at(raw, &["default_summary", "markdown_formatted"]).map(str::to_string),
            scheduled_start: str_at(raw, &["meeting", "scheduled_start_time"]).map(str::to_string),
            recording_start: str_at(raw, &["recording", "start_time"]).map(str::to_string),
            recording_end: str_at(raw, &["recording", "end_time"]).map(str::to_string),
            duration_minutes: Self::duration_minutes(raw),
            transcript_text,
            share_url: str_at(raw, &["share_url"]).map(str::to_string),
            transcript_url: str_at(raw, &["url"]).map(str::to_string),
            speakers,
            raw: raw.clone(),
        })))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// API client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct FathomClient {
    base_url: String,
    client: reqwest::Client,
}

impl FathomClient {
    pub fn new() -> Self {
        Self {
            base_url: FATHOM_API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn api_key(closer: &Closer) -> Result<&str> {
        closer
            .transcript_credential
            .as_deref()
            .ok_or_else(|| Error::Auth(format!("closer {} has no Fathom credential", closer.id)))
    }

    async fn check(resp: reqwest::Response, op: &str) -> Result<Value> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Provider {
                provider: "fathom".into(),
                message: format!("{op} failed with {status}: {body}"),
            });
        }
        resp.json().await.map_err(from_reqwest)
    }
}

impl Default for FathomClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscriptPullApi for FathomClient {
    fn provider_key(&self) -> &'static str {
        "fathom"
    }

    async fn list_meetings_since(
        &self,
        closer: &Closer,
        since: DateTime<Utc>,
    ) -> Result<Vec<Value>> {
        let key = Self::api_key(closer)?;
        let url = format!("{}/meetings", self.base_url);
        let resp = self
            .client
            .get(&url)
            .header("X-Api-Key", key)
            .query(&[
                ("created_after", since.to_rfc3339()),
                ("include_transcript", "true".into()),
            ])
            .send()
            .await
            .map_err(from_reqwest)?;
        let body = Self::check(resp, "list_meetings_since").await?;
        Ok(body
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    async fn register_webhook(
        &self,
        closer: &Closer,
        callback_url: &str,
    ) -> Result<RegisteredWebhook> {
        let key = Self::api_key(closer)?;
        let url = format!("{}/webhooks", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("X-Api-Key", key)
            .json(&serde_json::json!({
                "destination_url": callback_url,
                "include_transcript": true,
            }))
            .send()
            .await
            .map_err(from_reqwest)?;
        let body = Self::check(resp, "register_webhook").await?;
        let id = body
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let secret = body
            .get("secret")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if id.is_empty() {
            return Err(Error::Provider {
                provider: "fathom".into(),
                message: "register_webhook returned no id".into(),
            });
        }
        Ok(RegisteredWebhook { id, secret })
    }

    async fn delete_webhook(&self, closer: &Closer, webhook_id: &str) -> Result<()> {
        let key = Self::api_key(closer)?;
        let url = format!("{}/webhooks/{webhook_id}", self.base_url);
        let resp = self
            .client
            .delete(&url)
            .header("X-Api-Key", key)
            .send()
            .await
            .map_err(from_reqwest)?;
        // Already-deleted webhooks count as success.
        if resp.status().is_success() || resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        let status = resp.status();
        Err(Error::Provider {
            provider: "fathom".into(),
            message: format!("delete_webhook failed with {status}"),
        })
    }
}
