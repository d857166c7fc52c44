//! Prospect identity extraction from calendar events.
//!
//! Three-tier fallback, used both on create and on update-with-change:
//! 1. the first attendee that is neither the organizer nor a known closer;
//! 2. the event title, scrubbed of prefixes, emails, the closer's name,
//!    tenant filter phrases, filler, numbering, and separators;
//! 3. parenthesised or bracketed title content, when it looks like a name;
//! 4. a display name derived from the email prefix.

use std::collections::HashSet;

use regex::Regex;

use cs_domain::event::CanonicalCalendarEvent;
use cs_domain::tenant::{normalize_email, Closer};

/// Resolved prospect identity. `email` is `None` when no attendee carried
/// one; the caller stores the "unknown" sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProspectIdentity {
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Words that never belong to a prospect name. "&" is deliberately absent:
/// it connects couple names ("Sam & Dana").
const FILLER_WORDS: &[&str] = &[
    "call", "calls", "meeting", "session", "chat", "with", "and", "vs", "for",
    "w", "w/", "booked", "scheduled", "follow", "followup", "up",
    "rescheduled", "consult", "consultation", "demo", "intro", "at",
    "assigned", "to", "appointment", "invite", "sync",
];

const TITLE_PREFIXES: &[&str] = &[
    "re", "fwd", "fw", "canceled", "cancelled", "confirmed", "updated",
    "invitation", "reminder",
];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Extract the prospect for an event owned by `closer`.
/// `tenant_closer_emails` holds every closer work email in the tenant so a
/// colleague on the invite is never mistaken for the prospect.
pub fn extract_prospect(
    event: &CanonicalCalendarEvent,
    closer: &Closer,
    tenant_closer_emails: &HashSet<String>,
    filter_phrases: &[String],
) -> ProspectIdentity {
    let organizer = normalize_email(&event.organizer_email);

    // Tier 1: a real attendee that is neither organizer nor closer.
    let attendee = event.attendees.iter().find(|a| {
        !a.is_organizer
            && !a.email.is_empty()
            && a.email != organizer
            && !tenant_closer_emails.contains(&a.email)
    });

    let from_title = || {
        name_from_title(&event.title, closer, filter_phrases)
            .or_else(|| name_from_wrapped_content(&event.title))
    };

    match attendee {
        Some(a) => {
            let name = a
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .or_else(from_title)
                .or_else(|| Some(name_from_email(&a.email)));
            ProspectIdentity {
                email: Some(a.email.clone()),
                name,
            }
        }
        None => ProspectIdentity {
            email: None,
            name: from_title(),
        },
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tier 2: title scrubbing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Scrub a title down to a candidate prospect name. Returns `None` when the
/// residue does not look like a name, or when it is ambiguous (a single
/// word equal to the closer's first name).
pub fn name_from_title(
    title: &str,
    closer: &Closer,
    filter_phrases: &[String],
) -> Option<String> {
    let mut s = title.to_string();

    // Provider prefixes, repeated ("RE: Fwd: ...").
    let prefix_re = Regex::new(&format!(
        r"(?i)^\s*(?:{})\s*:\s*",
        TITLE_PREFIXES.join("|")
    ))
    .ok()?;
    loop {
        let stripped = prefix_re.replace(&s, "").into_owned();
        if stripped == s {
            break;
        }
        s = stripped;
    }

    // Angle-bracketed email addresses.
    s = Regex::new(r"<[^>]*>").ok()?.replace_all(&s, " ").into_owned();

    // Parenthesised and bracketed content (kept for the tier-3 fallback).
    s = Regex::new(r"\([^)]*\)|\[[^\]]*\]")
        .ok()?
        .replace_all(&s, " ")
        .into_owned();

    // The closer's full name, whole phrase only. "Tyler Smith" survives
    // when the closer is "Tyler Ray".
    let full = closer.display_name.trim();
    if !full.is_empty() {
        let re = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(full))).ok()?;
        s = re.replace_all(&s, " ").into_owned();
    }

    // "w/ <closer first>" and "with <closer first>", only when no surname
    // follows. A trailing letter-word means this names someone else.
    let first = closer.first_name();
    if !first.is_empty() {
        let re = Regex::new(&format!(
            r"(?i)\b(?:w/|with)\s+{}\b(\s+\p{{L}}+)?",
            regex::escape(first)
        ))
        .ok()?;
        s = re
            .replace_all(&s, |caps: &regex::Captures| {
                if caps.get(1).is_some() {
                    caps[0].to_string()
                } else {
                    String::new()
                }
            })
            .into_owned();
    }

    // Tenant filter phrases, longest first so "strategy call" goes before
    // "strategy".
    let mut phrases: Vec<&String> = filter_phrases.iter().filter(|p| *p != "*").collect();
    phrases.sort_by_key(|p| std::cmp::Reverse(p.len()));
    for phrase in phrases {
        if phrase.is_empty() {
            continue;
        }
        let re = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(phrase))).ok()?;
        s = re.replace_all(&s, " ").into_owned();
    }

    // Separators first, so "Consult:" and "Follow-Up" become plain words
    // the filler pass can see.
    s = Regex::new(r"[|:;,•~_–—-]+|/")
        .ok()?
        .replace_all(&s, " ")
        .into_owned();

    // Ordinals and hash-numbering ("2nd", "#3").
    s = Regex::new(r"(?i)\b\d+(?:st|nd|rd|th)\b|#\s*\d+")
        .ok()?
        .replace_all(&s, " ")
        .into_owned();

    // Generic filler.
    for word in FILLER_WORDS {
        let re = Regex::new(&format!(r"(?i)(?:^|\s){}(?:\s|$)", regex::escape(word))).ok()?;
        // Replace repeatedly: adjacent fillers share the boundary space.
        loop {
            let next = re.replace_all(&s, " ").into_owned();
            if next == s {
                break;
            }
            s = next;
        }
    }

    let words: Vec<&str> = s.split_whitespace().collect();
    if !looks_like_name(&words) {
        return None;
    }
    // A lone first name matching the closer is ambiguous ("Call w Tyler"
    // could be the closer themselves); prefer the later tiers.
    if words.len() == 1 && words[0].eq_ignore_ascii_case(first) {
        return None;
    }
    Some(title_case(&words))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tier 3: wrapped content
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parenthesised or bracketed title content, when name-like.
pub fn name_from_wrapped_content(title: &str) -> Option<String> {
    let re = Regex::new(r"\(([^)]+)\)|\[([^\]]+)\]").ok()?;
    for caps in re.captures_iter(title) {
        let content = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or("");
        let words: Vec<&str> = content.split_whitespace().collect();
        if looks_like_name(&words) {
            return Some(title_case(&words));
        }
    }
    None
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tier 4: email prefix
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Derive a display name from an email prefix: split on `.`/`_`/`-`/`+`,
/// title-case every part that is not purely numeric.
pub fn name_from_email(email: &str) -> String {
    let prefix = email.split('@').next().unwrap_or(email);
    prefix
        .split(['.', '_', '-', '+'])
        .filter(|p| !p.is_empty())
        .map(|p| {
            if p.chars().all(|c| c.is_ascii_digit()) {
                p.to_string()
            } else {
                capitalize(p)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 1-6 words, each a letter-word, "&", or a number.
fn looks_like_name(words: &[&str]) -> bool {
    if words.is_empty() || words.len() > 6 {
        return false;
    }
    words.iter().all(|w| {
        *w == "&"
            || w.chars().all(|c| c.is_ascii_digit())
            || (w.chars().next().is_some_and(|c| c.is_alphabetic())
                && w.chars().all(|c| c.is_alphabetic() || c == '\'' || c == '.'))
    })
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

fn title_case(words: &[&str]) -> String {
    words
        .iter()
        .map(|w| {
            if *w == "&" || w.chars().all(|c| c.is_ascii_digit()) {
                w.to_string()
            } else {
                capitalize(w)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
