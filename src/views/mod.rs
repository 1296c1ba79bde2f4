//! HTML views for room signage
//!
//! Renderers are pure functions over decoded events so they can be tested without
//! a server. Every piece of API text goes through `escape`.

mod cover;
mod locations;
mod schedule;

pub use cover::{current_event, render_cover, CoverScreen, NO_CURRENT_EVENT};
pub use locations::render_locations;
pub use schedule::{group_schedule, render_schedule, ScheduleEntry};

use std::fmt::Write;

/// Escapes text for inclusion in HTML element content or attribute values
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Wraps `body` in a minimal standalone page
pub fn page(title: &str, body: &str) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <meta http-equiv=\"refresh\" content=\"60\">\n<title>{}</title>\n</head>\n\
         <body>\n{}</body>\n</html>\n",
        escape(title),
        body
    );
    html
}

/// Page shown when the upstream API could not be reached
pub fn render_error(message: &str) -> String {
    page(
        "Unavailable",
        &format!("<h1>Schedule unavailable</h1>\n<p>{}</p>\n", escape(message)),
    )
}

/// Extracts `HH:MM` from an ISO local date-time like `2024-01-01T09:30:00`
pub fn clock_time(date_time: &str) -> Option<&str> {
    let (_, time) = date_time.split_once('T')?;
    let bytes = time.as_bytes();
    let well_formed = bytes.len() >= 5
        && bytes[2] == b':'
        && bytes[..2].iter().all(u8::is_ascii_digit)
        && bytes[3..5].iter().all(u8::is_ascii_digit);
    if well_formed {
        Some(&time[..5])
    } else {
        None
    }
}
