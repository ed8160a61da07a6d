//! Server-rendered HTML. Templates are embedded at compile time and filled by
//! replacing `<!-- NAME -->` markers; every inserted value is escaped.

use axum::response::Html;

static INDEX_HTML: &str = include_str!("../static/index.html");
static SCHEDULE_HTML: &str = include_str!("../static/schedule.html");

/// Values echoed back into the schedule form.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormValues<'a> {
    pub url: &'a str,
    pub comment: &'a str,
    pub datetime: &'a str,
}

pub enum Notice<'a> {
    None,
    Error(&'a str),
    Scheduled {
        job_id: &'a str,
        local: &'a str,
        utc: &'a str,
    },
}

pub fn login(authorize_url: &str) -> Html<String> {
    Html(INDEX_HTML.replace("<!-- AUTHORIZE_URL -->", &html_escape(authorize_url)))
}

pub fn schedule(base_url: &str, timezone: &str, values: FormValues<'_>, notice: Notice<'_>) -> Html<String> {
    let message = match notice {
        Notice::None => String::new(),
        Notice::Error(msg) => format!(r#"<p class="error">{}</p>"#, html_escape(msg)),
        Notice::Scheduled { job_id, local, utc } => format!(
            r#"<p class="ok">Scheduled for {} ({} UTC). Job <code>{}</code>.</p>"#,
            html_escape(local),
            html_escape(utc),
            html_escape(job_id)
        ),
    };
    Html(
        SCHEDULE_HTML
            .replace("<!-- MESSAGE -->", &message)
            .replace("<!-- BASE_URL -->", &html_escape(base_url.trim_end_matches('/')))
            .replace("<!-- TIMEZONE -->", &html_escape(timezone))
            .replace("<!-- URL -->", &html_escape(values.url))
            .replace("<!-- COMMENT -->", &html_escape(values.comment))
            .replace("<!-- DATETIME -->", &html_escape(values.datetime)),
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
