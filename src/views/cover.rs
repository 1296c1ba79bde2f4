//! Cover screen: the event currently running in one room

use chrono::NaiveTime;
use std::fmt::Write;

use super::{clock_time, escape, page};
use crate::data::BookingEvent;

/// Shown when nothing is running in the room
pub const NO_CURRENT_EVENT: &str = "No Current Event";

/// What the cover screen displays
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverScreen {
    pub event_name: String,
    /// `HH:MM`
    pub start: String,
    /// `HH:MM`
    pub end: String,
}

/// Finds the posted event in `room_id` running at wall-clock time `now`
///
/// An event is in the room when its function room is `room_id`, or when
/// `in_group(room_id, event_room)` says the event's room is a group containing it.
/// Start and end are read as times on today's date; start is inclusive and end
/// exclusive. If several events match, the last one wins.
pub fn current_event<F>(
    events: &[BookingEvent],
    room_id: &str,
    now: NaiveTime,
    in_group: F,
) -> Option<CoverScreen>
where
    F: Fn(&str, &str) -> bool,
{
    let mut current = None;

    for event in events.iter().filter(|e| e.is_posted) {
        if event.function_room_name != room_id && !in_group(room_id, &event.function_room_name) {
            continue;
        }

        let (Some(start), Some(end)) = (
            clock_time(&event.start_date_time),
            clock_time(&event.end_date_time),
        ) else {
            tracing::warn!(event_id = %event.id, "skipping event with unreadable times");
            continue;
        };
        let (Ok(start_time), Ok(end_time)) = (
            NaiveTime::parse_from_str(start, "%H:%M"),
            NaiveTime::parse_from_str(end, "%H:%M"),
        ) else {
            continue;
        };

        if start_time <= now && now < end_time {
            current = Some(CoverScreen {
                event_name: event.name.clone(),
                start: start.to_string(),
                end: end.to_string(),
            });
        }
    }

    current
}

/// Renders the cover page for `room_id`
pub fn render_cover(room_id: &str, screen: Option<&CoverScreen>) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "<h2 class=\"room\">{}</h2>", escape(room_id));
    match screen {
        Some(screen) => {
            let _ = writeln!(
                body,
                "<h1 class=\"event\">{}</h1>\n<p class=\"time\">{} - {}</p>",
                escape(&screen.event_name),
                escape(&screen.start),
                escape(&screen.end)
            );
        }
        None => {
            let _ = writeln!(body, "<h1 class=\"event\">{}</h1>", NO_CURRENT_EVENT);
        }
    }
    page(room_id, &body)
}
