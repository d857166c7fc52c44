//! Canonical provider payload shapes.
//!
//! Adapters normalize heterogeneous provider JSON into these; everything
//! downstream of the adapter boundary sees only canonical shapes.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Calendar
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarEventType {
    Confirmed,
    Cancelled,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub email: String,
    pub name: Option<String>,
    pub is_organizer: bool,
    pub response_status: Option<String>,
}

/// A calendar event normalized out of its provider shape. Start and end are
/// ISO strings preserving the original offset; `timezone` is the provider's
/// declared zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalCalendarEvent {
    pub event_id: String,
    pub event_type: CalendarEventType,
    pub title: String,
    pub start: String,
    pub end: Option<String>,
    pub timezone: String,
    pub organizer_email: String,
    pub attendees: Vec<Attendee>,
    pub status: String,
    /// Attendee emails whose response status is declined. Derived by the
    /// adapter so the orchestrator never touches raw provider fields.
    pub declined_attendees: Vec<String>,
    /// Provider's last-modified stamp, used to pick the winner when the same
    /// event appears on several closers' calendars in one delta batch.
    pub updated: Option<String>,
}

impl CanonicalCalendarEvent {
    pub fn is_cancelled(&self) -> bool {
        self.event_type == CalendarEventType::Cancelled
            || self.status.eq_ignore_ascii_case("cancelled")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transcripts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerStats {
    pub name: String,
    pub utterances: u32,
    pub words: u32,
}

/// A meeting transcript normalized out of its provider shape. The transcript
/// text is flattened: one `HH:MM:SS - Speaker: text` line per utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalTranscript {
    pub provider: String,
    pub meeting_id: String,
    pub closer_email: String,
    pub prospect_email: Option<String>,
    pub prospect_name: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub scheduled_start: Option<String>,
    pub recording_start: Option<String>,
    pub recording_end: Option<String>,
    pub duration_minutes: Option<u32>,
    pub transcript_text: String,
    pub share_url: Option<String>,
    pub transcript_url: Option<String>,
    pub speakers: Vec<SpeakerStats>,
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl CanonicalTranscript {
    pub fn speaker_count(&self) -> usize {
        self.speakers.len()
    }
}

/// Render one utterance in the flattened transcript format.
pub fn render_utterance(offset_seconds: u32, speaker: &str, text: &str) -> String {
    let h = offset_seconds / 3600;
    let m = (offset_seconds % 3600) / 60;
    let s = offset_seconds % 60;
    format!("{h:02}:{m:02}:{s:02} - {speaker}: {text}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utterance_rendering() {
        assert_eq!(render_utterance(0, "Sarah", "Hi John"), "00:00:00 - Sarah: Hi John");
        assert_eq!(
            render_utterance(3725, "John", "Sounds good"),
            "01:02:05 - John: Sounds good"
        );
    }

    #[test]
    fn cancelled_detection_covers_status_and_type() {
        let mut e = CanonicalCalendarEvent {
            event_id: "e1".into(),
            event_type: CalendarEventType::Confirmed,
            title: "Strategy Call".into(),
            start: "2026-02-20T20:00:00Z".into(),
            end: None,
            timezone: "UTC".into(),
            organizer_email: "sarah@x.com".into(),
            attendees: vec![],
            status: "confirmed".into(),
            declined_attendees: vec![],
            updated: None,
        };
        assert!(!e.is_cancelled());
        e.status = "cancelled".into();
        assert!(e.is_cancelled());
        e.status = "confirmed".into();
        e.event_type = CalendarEventType::Cancelled;
        assert!(e.is_cancelled());
    }
}
