//! Production calendar feed
//!
//! An iCalendar (RFC 5545) feed with one all-day event per live quotation or
//! ticket that has a production date.

use crate::cache::{keys, Cache};
use crate::config::CALENDAR_CACHE_TTL_SECS;
use crate::database::{DocumentStatus, EntityKind, Repository};
use crate::error::Result;
use chrono::{DateTime, Days, NaiveDate, Utc};
use sqlx::FromRow;
use std::fmt::Write;
use std::time::Duration;

/// One dated production
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct CalendarEntry {
    pub id: String,
    pub number: String,
    pub client_name: String,
    pub event_name: Option<String>,
    pub production_date: NaiveDate,
    pub status: DocumentStatus,
}

#[derive(Clone)]
pub struct CalendarService {
    repo: Repository,
    cache: Cache,
}

impl CalendarService {
    pub fn new(repo: Repository, cache: Cache) -> Self {
        Self { repo, cache }
    }

    /// The feed as `text/calendar` content, read through the cache
    pub async fn feed(&self) -> Result<String> {
        if let Some(feed) = self.cache.get_json::<String>(keys::calendar()).await {
            return Ok(feed);
        }

        let mut entries = Vec::new();
        for kind in EntityKind::ALL.into_iter().filter(|k| k.on_calendar()) {
            for entry in self.entries(kind).await? {
                entries.push((kind, entry));
            }
        }
        entries.sort_by(|(_, a), (_, b)| a.production_date.cmp(&b.production_date));

        let feed = render(&entries, Utc::now());
        self.cache
            .set_json(
                keys::calendar(),
                &feed,
                Duration::from_secs(CALENDAR_CACHE_TTL_SECS),
            )
            .await;

        tracing::debug!("Rendered calendar feed with {} events", entries.len());
        Ok(feed)
    }

    async fn entries(&self, kind: EntityKind) -> Result<Vec<CalendarEntry>> {
        let sql = format!(
            r#"
            SELECT id, quotation_number AS number, client_name, event_name, production_date, status
            FROM {}
            WHERE deleted_at IS NULL AND production_date IS NOT NULL
            ORDER BY production_date
            "#,
            kind.table()
        );

        let entries = sqlx::query_as::<_, CalendarEntry>(&sql)
            .fetch_all(self.repo.pool())
            .await?;

        Ok(entries)
    }
}

fn render(entries: &[(EntityKind, CalendarEntry)], stamp: DateTime<Utc>) -> String {
    let mut out = String::new();
    let stamp = stamp.format("%Y%m%dT%H%M%SZ").to_string();

    push_line(&mut out, "BEGIN:VCALENDAR");
    push_line(&mut out, "VERSION:2.0");
    push_line(&mut out, "PRODID:-//bizdesk//Production Calendar//EN");
    push_line(&mut out, "CALSCALE:GREGORIAN");
    push_line(&mut out, "X-WR-CALNAME:Productions");

    for (kind, entry) in entries {
        let start = entry.production_date;
        let end = start.checked_add_days(Days::new(1)).unwrap_or(start);
        let summary = match &entry.event_name {
            Some(event) if !event.trim().is_empty() => format!("{} - {}", event, entry.client_name),
            _ => entry.client_name.clone(),
        };

        push_line(&mut out, "BEGIN:VEVENT");
        push_line(&mut out, &format!("UID:{}-{}@bizdesk", kind, entry.id));
        push_line(&mut out, &format!("DTSTAMP:{}", stamp));
        push_line(&mut out, &format!("DTSTART;VALUE=DATE:{}", start.format("%Y%m%d")));
        push_line(&mut out, &format!("DTEND;VALUE=DATE:{}", end.format("%Y%m%d")));
        push_line(&mut out, &format!("SUMMARY:{}", escape(&summary)));
        push_line(
            &mut out,
            &format!("DESCRIPTION:{} ({})", escape(&entry.number), entry.status),
        );
        if entry.status == DocumentStatus::Draft {
            push_line(&mut out, "STATUS:TENTATIVE");
        } else {
            push_line(&mut out, "STATUS:CONFIRMED");
        }
        push_line(&mut out, "END:VEVENT");
    }

    push_line(&mut out, "END:VCALENDAR");
    out
}

fn push_line(out: &mut String, line: &str) {
    let _ = write!(out, "{}\r\n", line);
}

/// Escape TEXT values
fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            ';' => escaped.push_str("\\;"),
            ',' => escaped.push_str("\\,"),
            '\n' => escaped.push_str("\\n"),
            '\r' => {}
            other => escaped.push(other),
        }
    }
    escaped
}
