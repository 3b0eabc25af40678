//! Terminal view of the message list.

use client_core::{DisplayMessage, MessageBody};
use reply_format::{html_to_text, FormattedOutput, TableRow, TableView};
use shared::domain::ConversationTurn;
use unicode_width::UnicodeWidthStr;

pub fn render_message(message: &DisplayMessage) -> String {
    match message {
        DisplayMessage::Outgoing {
            text, attachment, ..
        } => {
            let mut out = format!("you> {text}");
            if let Some(attachment) = attachment {
                out.push_str(&format!(
                    "\n     [attachment: {}, {} bytes]",
                    attachment.mime_type,
                    attachment.data.len()
                ));
            }
            out
        }
        DisplayMessage::Incoming { body, .. } => render_body(body),
    }
}

pub fn render_body(body: &MessageBody) -> String {
    match body {
        MessageBody::Thinking => "bot> ...".to_string(),
        MessageBody::Notice(notice) => format!("bot! {}", notice.message),
        MessageBody::Reply(FormattedOutput::PlainText(html)) => {
            prefix_lines("bot> ", &html_to_text(html))
        }
        MessageBody::Reply(FormattedOutput::Table(table)) => {
            prefix_lines("bot> ", &render_table(table))
        }
    }
}

pub fn render_turn(turn: &ConversationTurn) -> String {
    let mut out = format!("#{} {:?}: {}", turn.turn_id, turn.role, turn.content);
    if let Some(attachment) = &turn.attachment {
        out.push_str(&format!(" [{}]", attachment.mime_type));
    }
    out
}

fn prefix_lines(prefix: &str, text: &str) -> String {
    let pad = " ".repeat(prefix.chars().count());
    text.lines()
        .enumerate()
        .map(|(idx, line)| {
            if idx == 0 {
                format!("{prefix}{line}")
            } else {
                format!("{pad}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_table(table: &TableView) -> String {
    let mut lines = Vec::new();

    if let Some(leading) = &table.leading {
        lines.push(html_to_text(leading));
    }
    lines.push(format!("[{}]", table.caption));

    let mut widths: Vec<usize> = table.header.iter().map(|h| display_width(h)).collect();
    for cells in table.cell_rows() {
        for (idx, cell) in cells.iter().enumerate() {
            if let Some(width) = widths.get_mut(idx) {
                *width = (*width).max(display_width(cell));
            }
        }
    }

    if !table.header.is_empty() {
        lines.push(format_row(&table.header, &widths));
        lines.push(
            widths
                .iter()
                .map(|w| "-".repeat(*w))
                .collect::<Vec<_>>()
                .join("-+-"),
        );
    }

    for row in &table.rows {
        match row {
            TableRow::Cells(cells) => lines.push(format_row(cells, &widths)),
            TableRow::Note(note) => lines.push(format!("  {note}")),
        }
    }

    if let Some(trailing) = &table.trailing {
        lines.push(html_to_text(trailing));
    }

    lines.join("\n")
}

fn format_row(cells: &[String], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| {
            let pad = width.saturating_sub(display_width(cell));
            format!("{cell}{}", " ".repeat(pad))
        })
        .collect::<Vec<_>>()
        .join(" | ")
        .trim_end()
        .to_string()
}

/// Terminal columns; emoji and CJK take two.
fn display_width(text: &str) -> usize {
    UnicodeWidthStr::width(text)
}
