//! Schedule screen: today's posted events grouped by who they are posted as

use std::collections::BTreeMap;
use std::fmt::Write;

use super::{clock_time, escape, page};
use crate::data::BookingEvent;

/// One row of the schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub name: String,
    pub room: String,
    /// `HH:MM`
    pub start: String,
    /// `HH:MM`
    pub end: String,
}

/// Groups posted events by `BookingPostAs`, each group sorted by start time
///
/// Unposted events and events with unreadable times are left out.
pub fn group_schedule(events: &[BookingEvent]) -> BTreeMap<String, Vec<ScheduleEntry>> {
    let mut groups: BTreeMap<String, Vec<ScheduleEntry>> = BTreeMap::new();

    for event in events.iter().filter(|e| e.is_posted) {
        let (Some(start), Some(end)) = (
            clock_time(&event.start_date_time),
            clock_time(&event.end_date_time),
        ) else {
            tracing::warn!(event_id = %event.id, "skipping event with unreadable times");
            continue;
        };

        groups
            .entry(event.booking_post_as.clone())
            .or_default()
            .push(ScheduleEntry {
                name: event.name.clone(),
                room: event.function_room_name.clone(),
                start: start.to_string(),
                end: end.to_string(),
            });
    }

    for entries in groups.values_mut() {
        entries.sort_by(|a, b| a.start.cmp(&b.start));
    }
    groups
}

/// Renders the schedule page; `heading` names the room group when filtered
pub fn render_schedule(heading: Option<&str>, events: &[BookingEvent]) -> String {
    let groups = group_schedule(events);
    let title = heading.unwrap_or("Today's Events");

    let mut body = String::new();
    let _ = writeln!(body, "<h1>{}</h1>", escape(title));
    if groups.is_empty() {
        body.push_str("<p class=\"empty\">No events scheduled</p>\n");
    }
    for (posted_as, entries) in &groups {
        let _ = writeln!(body, "<section>\n<h2>{}</h2>\n<table>", escape(posted_as));
        for entry in entries {
            let _ = writeln!(
                body,
                "<tr><td class=\"time\">{} - {}</td><td class=\"event\">{}</td><td class=\"room\">{}</td></tr>",
                escape(&entry.start),
                escape(&entry.end),
                escape(&entry.name),
                escape(&entry.room)
            );
        }
        body.push_str("</table>\n</section>\n");
    }

    page(title, &body)
}
