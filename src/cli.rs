//! CLI utilities for mywire.
//!
//! The utilities present in this module are used by the `mywire_cli` REPL.
use std::io::{BufRead, Write};

use crate::protocol::{QueryResult, Value};

/// Possible commands from a user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Exit command `.exit`, or end of input
    Exit,
    /// `.ping`
    Ping,
    /// `.use <db>`
    Use(String),
    /// SQL sent to the server as is
    Statement(String),
}

/// Prompt user for a command.
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> Result<Command, String>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    write!(&mut writer, "mysql> ")
        .and_then(|_| writer.flush())
        .map_err(|e| format!("failed to write prompt: {e}"))?;

    let read = reader
        .read_line(&mut s)
        .map_err(|e| format!("failed to read input: {e}"))?;
    if read == 0 {
        return Ok(Command::Exit);
    }

    match s.trim() {
        ".exit" => Ok(Command::Exit),
        ".ping" => Ok(Command::Ping),
        s if s == ".use" || s.starts_with(".use ") => match s[".use".len()..].trim() {
            "" => Err("usage: .use <db>".to_string()),
            db => Ok(Command::Use(db.to_string())),
        },
        s if !s.starts_with(".") => Ok(Command::Statement(s.trim_end_matches(';').to_string())),
        s => Err(format!("unrecognized command '{}'", s)),
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        v => v
            .to_text()
            .map(|t| String::from_utf8_lossy(&t).into_owned())
            .unwrap_or_default(),
    }
}

/// Renders a result the way the mysql client does: a table for rows, a
/// summary line otherwise.
pub fn format_result(result: &mut QueryResult) -> Result<String, String> {
    let Some(resultset) = result.resultset.as_mut() else {
        return Ok(format!(
            "Query OK, {} row(s) affected, last insert id {}",
            result.affected_rows, result.insert_id
        ));
    };

    let names: Vec<String> = resultset.fields.iter().map(|f| f.name.clone()).collect();
    let rows: Vec<Vec<String>> = resultset
        .values()
        .map_err(|e| e.to_string())?
        .iter()
        .map(|row| row.iter().map(cell).collect())
        .collect();

    let mut widths: Vec<usize> = names.iter().map(|n| n.chars().count()).collect();
    for row in &rows {
        for (w, c) in widths.iter_mut().zip(row) {
            *w = (*w).max(c.chars().count());
        }
    }

    let border = widths
        .iter()
        .map(|w| "-".repeat(w + 2))
        .collect::<Vec<_>>()
        .join("+");
    let border = format!("+{border}+");
    let line = |cells: &[String]| {
        let cells: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(c, &w)| format!(" {c:<w$} "))
            .collect();
        format!("|{}|", cells.join("|"))
    };

    let mut out = vec![border.clone(), line(&names), border.clone()];
    out.extend(rows.iter().map(|row| line(row)));
    out.push(border);
    out.push(format!("{} row(s) in set", rows.len()));
    Ok(out.join("\n"))
}
