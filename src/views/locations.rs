//! Venue listing

use std::fmt::Write;
use url::form_urlencoded;

use super::{escape, page};
use crate::data::Location;

/// Renders a table of venues with the ids used by the other views
pub fn render_locations(locations: &[Location]) -> String {
    let mut body = String::from("<h1>Locations</h1>\n");
    if locations.is_empty() {
        body.push_str("<p class=\"empty\">No locations</p>\n");
        return page("Locations", &body);
    }

    body.push_str("<table>\n<tr><th>Name</th><th>City</th><th>Id</th></tr>\n");
    for location in locations {
        let query: String = form_urlencoded::Serializer::new(String::new())
            .append_pair("location-id", &location.id)
            .finish();
        let _ = writeln!(
            body,
            "<tr><td>{}</td><td>{}</td><td><a href=\"/view/schedule?{}\">{}</a></td></tr>",
            escape(&location.name),
            escape(&location.city),
            escape(&query),
            escape(&location.id)
        );
    }
    body.push_str("</table>\n");
    page("Locations", &body)
}
