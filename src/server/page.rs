// src/server/page.rs

//! Entry page rendering.

use crate::session::LoginTicket;

const INDEX_TEMPLATE: &str = include_str!("../../templates/index.html");

/// Render the entry page for one login attempt.
pub fn render_index(ticket: &LoginTicket) -> String {
    INDEX_TEMPLATE
        .replace("{{ url }}", &escape_html(&ticket.login_url))
        .replace("{{ auth_id }}", &escape_html(ticket.session_id.as_str()))
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
