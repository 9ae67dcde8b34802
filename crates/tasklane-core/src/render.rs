use std::io::{self, IsTerminal, Write};

use chrono_tz::Tz;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::format_local;
use crate::filter::Tab;
use crate::list::{EMPTY_PLACEHOLDER, Listing};
use crate::reminder::NotificationRequest;
use crate::task::Task;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    tz: Tz,
}

impl Renderer {
    pub fn new(cfg: &Config, tz: Tz) -> anyhow::Result<Self> {
        Ok(Self {
            color: cfg.color()?,
            tz,
        })
    }

    /// Item renderer for [`crate::list::render`].
    pub fn task_row(&self, task: &Task) -> Vec<String> {
        let reminder = if task.is_reminder_on {
            task.reminder_date
                .with_timezone(&self.tz)
                .format("%H:%M")
                .to_string()
        } else {
            String::new()
        };

        vec![
            self.paint(&task.short_id(), "33"),
            format_local(task.deadline, self.tz),
            task.kind.to_string(),
            self.paint(task.color.name(), task.color.ansi_code()),
            task.title.clone(),
            reminder,
        ]
    }

    #[tracing::instrument(skip(self, listing))]
    pub fn print_listing(&mut self, tab: Tab, listing: Listing<Vec<String>>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", self.paint(tab.name(), "1"))?;

        match listing {
            Listing::Empty => writeln!(out, "{EMPTY_PLACEHOLDER}")?,
            Listing::Items(rows) => {
                let headers = ["ID", "Deadline", "Type", "Color", "Title", "Reminder"]
                    .into_iter()
                    .map(ToString::to_string)
                    .collect();
                write_table(&mut out, headers, rows)?;
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, task, pending))]
    pub fn print_task_info(
        &mut self,
        task: &Task,
        bucket: Tab,
        pending: &[NotificationRequest],
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id        {}", task.id)?;
        writeln!(out, "title     {}", task.title)?;
        writeln!(out, "color     {}", task.color)?;
        writeln!(out, "type      {}", task.kind)?;
        writeln!(out, "deadline  {}", format_local(task.deadline, self.tz))?;
        writeln!(out, "bucket    {bucket}")?;
        writeln!(out, "completed {}", task.is_completed)?;
        writeln!(out, "reminder  {}", if task.is_reminder_on { "on" } else { "off" })?;
        if task.is_reminder_on {
            writeln!(out, "remind at {}", format_local(task.reminder_date, self.tz))?;
            writeln!(out, "note      {}", task.reminder_text)?;
        }
        for request in pending {
            let t = request.trigger;
            writeln!(
                out,
                "scheduled {:04}-{:02}-{:02} {:02}:{:02}",
                t.year, t.month, t.day, t.hour, t.minute
            )?;
        }
        writeln!(out, "created   {}", format_local(task.created, self.tz))?;
        writeln!(out, "modified  {}", format_local(task.modified, self.tz))?;

        Ok(())
    }

    pub fn print_notification(&mut self, request: &NotificationRequest) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{} {}", self.paint("reminder:", "1;33"), request.title)?;
        if !request.body.is_empty() {
            writeln!(out, "  {}", request.body)?;
        }
        Ok(())
    }

    pub fn print_message(&mut self, message: &str) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{message}")?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ", width = *width)?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_pads_by_visible_width() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["ID".to_string(), "Title".to_string()],
            vec![
                vec!["\x1b[33mab\x1b[0m".to_string(), "Wäsche".to_string()],
                vec!["abcd".to_string(), "x".to_string()],
            ],
        )
        .expect("write table");

        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ID   Title  ");
        assert_eq!(lines[1], "---- ------ ");
        assert_eq!(strip_ansi(lines[2]), "ab   Wäsche ");
        assert_eq!(lines[3], "abcd x      ");
    }
}
