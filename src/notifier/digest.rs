use indoc::formatdoc;

use crate::models::Submission;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestEmail {
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

pub fn render_digest(partner_display_name: &str, submissions: &[Submission]) -> DigestEmail {
    let subject = format!("Artsy Submission Batch for: {partner_display_name}");

    let html_items: String = submissions
        .iter()
        .map(|submission| {
            format!(
                "<li><i>{title}</i><span>, {year}</span></li>\n",
                title = html_escape(title(submission)),
                year = html_escape(year(submission)),
            )
        })
        .collect();

    let text_items: String = submissions
        .iter()
        .map(|submission| format!("- {}, {}\n", title(submission), year(submission)))
        .collect();

    let html_body = formatdoc! {
        r#"
            <!DOCTYPE html>
            <html>
            <body>
            <p>Hello {name},</p>
            <p>The following works have been approved for consignment:</p>
            <ul>
            {html_items}</ul>
            </body>
            </html>
        "#,
        name = html_escape(partner_display_name),
        html_items = html_items,
    };

    let text_body = formatdoc! {
        r#"
            Hello {name},

            The following works have been approved for consignment:

            {text_items}"#,
        name = partner_display_name,
        text_items = text_items,
    };

    DigestEmail {
        subject,
        html_body,
        text_body,
    }
}

fn title(submission: &Submission) -> &str {
    submission.title.as_deref().unwrap_or("Untitled")
}

fn year(submission: &Submission) -> &str {
    submission.year.as_deref().unwrap_or("n.d.")
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
