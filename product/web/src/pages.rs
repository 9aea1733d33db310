// Server-rendered HTML for the form and result pages.

use imgharvest_engine::accumulate::{DEFAULT_MAX_ROUNDS, DEFAULT_MIN_FRACTION};
use imgharvest_engine::harvest::{
    DEFAULT_TARGET, MAX_FRACTION, MAX_ROUNDS, MAX_TARGET, MIN_FRACTION, MIN_ROUNDS, MIN_TARGET,
};

use crate::routes::HarvestForm;

const TITLE: &str = "Bing Image ZIP Downloader";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

impl NoticeLevel {
    fn css_class(&self) -> &'static str {
        match self {
            NoticeLevel::Success => "success",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// A download link shown under a notice.
#[derive(Debug, Clone)]
pub struct DownloadLink {
    pub href: String,
    pub file_name: String,
}

pub fn form_page(form: &HarvestForm) -> String {
    layout(&form_html(form))
}

pub fn result_page(notices: &[Notice], link: Option<&DownloadLink>, form: &HarvestForm) -> String {
    let mut body = String::new();
    for notice in notices {
        body.push_str(&format!(
            "<p class=\"notice {}\">{}</p>\n",
            notice.level.css_class(),
            escape_html(&notice.message)
        ));
    }
    if let Some(link) = link {
        body.push_str(&format!(
            "<p><a class=\"download\" href=\"{}\" download=\"{}\">Download ZIP</a></p>\n",
            escape_html(&link.href),
            escape_html(&link.file_name)
        ));
    }
    body.push_str(&form_html(form));
    layout(&body)
}

fn form_html(form: &HarvestForm) -> String {
    let target = value_or(&form.target, &DEFAULT_TARGET.to_string());
    let min_fraction = value_or(&form.min_fraction, &format!("{DEFAULT_MIN_FRACTION:.2}"));
    let max_rounds = value_or(&form.max_rounds, &DEFAULT_MAX_ROUNDS.to_string());

    format!(
        r#"<form method="post" action="/harvest">
  <label>Search term (e.g. skin stapler)
    <input type="text" name="query" value="{query}" required>
  </label>
  <label>Number of images (target)
    <input type="number" name="target" min="{min_target}" max="{max_target}" step="10" value="{target}">
  </label>
  <label>Minimum acceptable fraction
    <input type="number" name="min_fraction" min="{min_fraction_lo:.2}" max="{min_fraction_hi:.2}" step="0.01" value="{min_fraction}">
  </label>
  <label>Max search rounds
    <input type="number" name="max_rounds" min="{min_rounds}" max="{max_rounds_hi}" step="1" value="{max_rounds}">
  </label>
  <button type="submit">Download &amp; Build ZIP</button>
</form>
"#,
        query = escape_html(&form.query),
        min_target = MIN_TARGET,
        max_target = MAX_TARGET,
        target = escape_html(&target),
        min_fraction_lo = MIN_FRACTION,
        min_fraction_hi = MAX_FRACTION,
        min_fraction = escape_html(&min_fraction),
        min_rounds = MIN_ROUNDS,
        max_rounds_hi = MAX_ROUNDS,
        max_rounds = escape_html(&max_rounds),
    )
}

fn layout(body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{TITLE}</title>
<style>
  body {{ font-family: sans-serif; max-width: 40rem; margin: 2rem auto; }}
  label {{ display: block; margin: 0.75rem 0; }}
  input {{ display: block; width: 100%; }}
  .notice {{ padding: 0.75rem; border-radius: 4px; }}
  .success {{ background: #e6f4ea; }}
  .warning {{ background: #fff4e5; }}
  .error {{ background: #fdecea; }}
</style>
</head>
<body>
<h1>{TITLE}</h1>
<p>Downloads images from Bing Images results and packs them into a ZIP.</p>
{body}</body>
</html>
"#
    )
}

fn value_or(value: &str, default: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
