//! Telegram HTML rendering for fault notifications.
//!
//! Telegram HTML supports only a small subset: `<b>`, `<i>`, `<code>`, `<pre>`, `<a href="...">`.

use frp_core::notification::Notification;

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// `**Kind**\nmessage` field values become `<b>Kind</b>\nmessage`.
fn field_value_html(value: &str) -> String {
    let (head, rest) = match value.split_once('\n') {
        Some((h, r)) => (h, Some(r)),
        None => (value, None),
    };
    let head = match head.strip_prefix("**").and_then(|h| h.strip_suffix("**")) {
        Some(kind) => format!("<b>{}</b>", escape_html(kind)),
        None => escape_html(head),
    };
    match rest {
        Some(r) => format!("{head}\n{}", escape_html(r)),
        None => head,
    }
}

pub fn render_notification(n: &Notification) -> String {
    let title = escape_html(&n.title);
    let mut out = match &n.url {
        Some(url) => format!("🚨 <a href=\"{}\"><b>{title}</b></a>", escape_html(url)),
        None => format!("🚨 <b>{title}</b>"),
    };
    out.push_str(&format!(
        "\n<i>{}</i>",
        n.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    if let Some(author) = &n.author {
        out.push_str(&format!("\n{}", escape_html(&author.name)));
    }
    for field in &n.fields {
        out.push_str(&format!(
            "\n\n<b>{}</b>\n{}",
            escape_html(&field.name),
            field_value_html(&field.value)
        ));
    }
    if let Some(content) = &n.content {
        out.push_str(&format!("\n\n{}", escape_html(content)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use frp_core::notification::{NotificationAuthor, NotificationField, ERROR_COLOR};

    fn notification() -> Notification {
        Notification {
            title: "AppErr:00000000000000000042-0000000007".to_string(),
            url: None,
            color: ERROR_COLOR,
            timestamp: Utc.timestamp_millis_opt(1_500_000_000_000).unwrap(),
            author: Some(NotificationAuthor {
                name: "Sushi>general>alice#0001".to_string(),
                icon_url: None,
            }),
            fields: vec![NotificationField {
                name: "Exception:".to_string(),
                value: "**CommandError**\nexpected <role> & got none".to_string(),
            }],
            content: None,
            attachment: None,
        }
    }

    #[test]
    fn escapes_user_text() {
        let html = render_notification(&notification());
        assert!(html.contains("Sushi&gt;general&gt;alice#0001"));
        assert!(html.contains("<b>CommandError</b>\nexpected &lt;role&gt; &amp; got none"));
        assert!(html.contains("<i>2017-07-14 02:40:00 UTC</i>"));
    }

    #[test]
    fn archive_url_links_the_title() {
        let mut n = notification();
        n.url = Some("https://pastebin.com/Xk2bQ9rT".to_string());
        let html = render_notification(&n);
        assert!(html.starts_with(
            "🚨 <a href=\"https://pastebin.com/Xk2bQ9rT\"><b>AppErr:00000000000000000042-0000000007</b></a>"
        ));
    }

    #[test]
    fn plain_field_values_are_kept() {
        assert_eq!(field_value_html("**Etc...**"), "<b>Etc...</b>");
        assert_eq!(field_value_html("a < b"), "a &lt; b");
    }
}
