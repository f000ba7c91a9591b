//! CSV output formatter

use super::display_value;
use datasift_core::agent::AgentResponse;
use datasift_core::Row;

/// Header is the union of row keys in first-seen order
pub fn format_rows(rows: &[Row]) -> String {
    let mut header: Vec<&str> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !header.contains(&key.as_str()) {
                header.push(key);
            }
        }
    }

    let mut output = header.iter().map(|h| escape_csv(h)).collect::<Vec<_>>().join(",");
    output.push('\n');

    for row in rows {
        let line = header
            .iter()
            .map(|h| escape_csv(&row.get(*h).map(display_value).unwrap_or_default()))
            .collect::<Vec<_>>()
            .join(",");
        output.push_str(&line);
        output.push('\n');
    }

    output
}

pub fn format_steps(response: &AgentResponse) -> String {
    let mut output = String::from("step,tool,status,detail\n");

    for step in &response.intermediate_steps {
        let tool = step.tool.map(|t| t.to_string()).unwrap_or_default();
        let (status, detail) = match (&step.output, &step.error) {
            (_, Some(e)) => ("error", e.clone()),
            (Some(o), None) => ("ok", o.to_string()),
            (None, None) => ("ok", String::new()),
        };
        output.push_str(&format!(
            "{},{},{},{}\n",
            step.index + 1,
            tool,
            status,
            escape_csv(&detail)
        ));
    }

    output
}

fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
