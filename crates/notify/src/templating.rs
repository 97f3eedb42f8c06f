//! Minijinja template rendering for alert emails.
//!
//! Every alert renders to a subject/text/HTML triple. Templates see the
//! serialized alert as `alert` (with `alert.kind.type` naming the
//! condition), plus `kind`, `source` and `created` convenience values.
//!
//! Templates are plain strings, so a fresh [`minijinja::Environment`] is
//! created per render call.

use chrono::{FixedOffset, Offset, Utc};
use minijinja::context;
use watchdesk_core::Alert;

use crate::traits::NotifyError;

pub const DEFAULT_SUBJECT_TEMPLATE: &str = "\
{%- if source == 'disclosure' %}[DART 공시] {{ alert.subject.name }} - {{ alert.title }}\
{%- elif source == 'price' %}[주가 알림] {{ alert.subject.name }}({{ alert.subject.id }}) - {{ alert.title }}\
{%- else %}[시스템 알림] {{ alert.title }}{% endif %}";

pub const DEFAULT_TEXT_TEMPLATE: &str = "\
{{ alert.title }}

{{ alert.message }}

severity: {{ alert.severity }}
subject:  {{ alert.subject.name }} ({{ alert.subject.id }})
{%- if kind == 'filing' %}
score:    {{ alert.priority }}
keywords: {{ alert.kind.matched_keywords | join(', ') }}
link:     {{ alert.kind.detail_url }}
{%- elif kind == 'target_reached' %}
price:    {{ alert.kind.price | round2 }} (target {{ alert.kind.target | round2 }})
{%- elif kind == 'stop_loss' %}
price:    {{ alert.kind.price | round2 }} (stop-loss {{ alert.kind.stop_loss | round2 }})
{%- elif kind == 'daily_surge' or kind == 'daily_drop' %}
change:   {{ alert.kind.change_percent | round2 }}% (threshold {{ alert.kind.threshold | round2 }}%)
{%- elif kind == 'parity' %}
parity:   {{ alert.kind.parity | round2 }}% (band {{ alert.kind.band }}%, conversion {{ alert.kind.conversion_price | round2 }})
{%- endif %}
time:     {{ created }}
";

pub const DEFAULT_HTML_TEMPLATE: &str = "\
<html><body style=\"font-family: sans-serif\">
<h2>{{ alert.title | e }}</h2>
<p>{{ alert.message | e }}</p>
<table cellpadding=\"4\">
<tr><td>severity</td><td><b>{{ alert.severity | e }}</b></td></tr>
<tr><td>subject</td><td>{{ alert.subject.name | e }} ({{ alert.subject.id | e }})</td></tr>
{%- if kind == 'filing' %}
<tr><td>score</td><td>{{ alert.priority }}</td></tr>
<tr><td>keywords</td><td>{{ alert.kind.matched_keywords | join(', ') | e }}</td></tr>
<tr><td>link</td><td><a href=\"{{ alert.kind.detail_url | e }}\">{{ alert.kind.detail_url | e }}</a></td></tr>
{%- elif kind == 'parity' %}
<tr><td>parity</td><td>{{ alert.kind.parity | round2 }}%</td></tr>
{%- endif %}
<tr><td>time</td><td>{{ created | e }}</td></tr>
</table>
</body></html>
";

/// One alert rendered for email.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedAlert {
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Renders alert templates using minijinja.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    subject: String,
    text: String,
    html: String,
    /// Offset used when formatting `created` for readers.
    display_offset: FixedOffset,
}

impl TemplateRenderer {
    /// Renderer with the built-in templates, timestamps shown in UTC.
    pub fn new() -> Self {
        Self {
            subject: DEFAULT_SUBJECT_TEMPLATE.to_string(),
            text: DEFAULT_TEXT_TEMPLATE.to_string(),
            html: DEFAULT_HTML_TEMPLATE.to_string(),
            display_offset: Utc.fix(),
        }
    }

    pub fn with_display_offset(mut self, offset: FixedOffset) -> Self {
        self.display_offset = offset;
        self
    }

    /// Replace the templates after checking each one parses.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] naming the first template that fails.
    pub fn with_templates(mut self, subject: &str, text: &str, html: &str) -> Result<Self, NotifyError> {
        for (name, src) in [("subject", subject), ("text", text), ("html", html)] {
            self.validate(src)
                .map_err(|e| NotifyError::Template(format!("{} template: {}", name, e)))?;
        }
        self.subject = subject.to_string();
        self.text = text.to_string();
        self.html = html.to_string();
        Ok(self)
    }

    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("round2", round2_filter);
        env
    }

    /// Render the subject/text/HTML triple for an alert.
    pub fn render(&self, alert: &Alert) -> Result<RenderedAlert, NotifyError> {
        let env = Self::build_env();
        let ctx = context! {
            alert => alert,
            kind => alert.kind.label(),
            source => alert.source.to_string(),
            created => alert
                .created_at
                .with_timezone(&self.display_offset)
                .format("%Y-%m-%d %H:%M:%S %:z")
                .to_string(),
        };
        let render = |src: &str| {
            env.render_str(src, &ctx)
                .map_err(|e| NotifyError::Template(e.to_string()))
        };
        Ok(RenderedAlert {
            subject: render(&self.subject)?.trim().to_string(),
            text: render(&self.text)?,
            html: render(&self.html)?,
        })
    }

    /// Check that a template string parses. Does not evaluate it.
    pub fn validate(&self, template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a float with two decimals.
fn round2_filter(value: f64) -> String {
    format!("{:.2}", value)
}
