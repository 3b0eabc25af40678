//! Widget markup for messages and formatted replies.

use crate::{text_to_html, FormattedOutput, TableRow, TableView};

pub fn render(output: &FormattedOutput) -> String {
    match output {
        FormattedOutput::PlainText(text) => text.clone(),
        FormattedOutput::Table(table) => render_table(table),
    }
}

/// User message bubble; `image_src` is usually a `data:` URI.
pub fn render_outgoing(text: &str, image_src: Option<&str>) -> String {
    let mut html = format!(r#"<div class="message-text">{}</div>"#, text_to_html(text));
    if let Some(src) = image_src {
        html.push_str(&format!(
            r#"<img class="attachment" src="{}">"#,
            attribute_value(src)
        ));
    }
    html
}

pub fn render_thinking() -> String {
    r#"<div class="message-text"><div class="thinking-indicator"><div class="dot"></div><div class="dot"></div><div class="dot"></div></div></div>"#
        .to_string()
}

pub fn render_error(message: &str) -> String {
    format!(r#"<div class="message-text error">{}</div>"#, text_to_html(message))
}

fn render_table(table: &TableView) -> String {
    let mut html = String::new();

    if let Some(leading) = &table.leading {
        push_additional_info(&mut html, leading);
    }

    html.push_str(&format!(
        r#"<div class="train-info-header">{}</div>"#,
        text_to_html(&table.caption)
    ));
    html.push_str(r#"<div class="train-table-wrapper"><table class="train-table">"#);

    if !table.header.is_empty() {
        html.push_str("<thead><tr>");
        for column in &table.header {
            html.push_str(&format!("<th>{}</th>", text_to_html(column)));
        }
        html.push_str("</tr></thead>");
    }

    html.push_str("<tbody>");
    for row in &table.rows {
        match row {
            TableRow::Cells(cells) => {
                html.push_str("<tr>");
                for cell in cells {
                    html.push_str(&format!("<td>{}</td>", text_to_html(cell)));
                }
                html.push_str("</tr>");
            }
            TableRow::Note(note) => html.push_str(&format!(
                r#"<tr><td colspan="{}">{}</td></tr>"#,
                table.width(),
                text_to_html(note)
            )),
        }
    }
    html.push_str("</tbody></table></div>");

    if let Some(trailing) = &table.trailing {
        push_additional_info(&mut html, trailing);
    }

    html
}

fn push_additional_info(html: &mut String, block: &str) {
    html.push_str(&format!(r#"<div class="train-additional-info">{block}</div>"#));
}

fn attribute_value(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}
