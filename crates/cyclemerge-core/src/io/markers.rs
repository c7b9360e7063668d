use std::path::Path;

use tracing::warn;

use crate::error::Result;

/// Header names that may hold the marker name, in order of preference.
const NAME_COLUMNS: [&str; 4] = ["marker_name", "marker", "name", "channel_name"];

fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            _ => field.push(ch),
        }
    }
    fields.push(field);
    fields.into_iter().map(|f| f.trim().to_string()).collect()
}

/// Marker names from a `markers.csv`, one per data row.
///
/// Each row contributes the first non-empty value among the recognised name
/// columns; rows without one are skipped. A file whose first line names none
/// of those columns has no header, and every line gives its first column.
pub fn read_marker_names(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    let text = text.trim_start_matches('\u{feff}');
    let mut lines = text.lines().filter(|l| !l.trim().is_empty()).peekable();
    let Some(header) = lines.peek() else {
        return Ok(Vec::new());
    };
    let header = split_record(header);
    let mut columns: Vec<usize> = NAME_COLUMNS
        .iter()
        .filter_map(|name| header.iter().position(|h| h == name))
        .collect();
    if columns.is_empty() {
        columns.push(0);
    } else {
        lines.next();
    }

    Ok(lines
        .filter_map(|line| {
            let record = split_record(line);
            columns
                .iter()
                .filter_map(|&c| record.get(c))
                .find(|v| !v.is_empty())
                .cloned()
        })
        .collect())
}

/// Names for `count` output channels.
///
/// Falls back to `Channel_<i>` (with a warning) when the file is missing,
/// unreadable, or lists a different number of names.
pub fn channel_names(path: Option<&Path>, count: usize) -> Option<Vec<String>> {
    let path = path?;
    match read_marker_names(path) {
        Ok(names) if names.len() == count => Some(names),
        Ok(names) => {
            warn!(
                path = %path.display(),
                found = names.len(),
                expected = count,
                "markers.csv entry count does not match the output channels, using default names"
            );
            None
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read markers.csv, using default names");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_quoted_fields() {
        assert_eq!(
            split_record(r#"1,"CD3, clone ""UCHT1""",x"#),
            vec!["1", "CD3, clone \"UCHT1\"", "x"]
        );
    }

    #[test]
    fn prefers_marker_name_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("markers.csv");
        std::fs::write(
            &path,
            "channel_number,cycle_number,marker_name,name\n1,1,DAPI,ignored\n2,1,,CD45\n3,2,,\n",
        )
        .unwrap();
        assert_eq!(read_marker_names(&path).unwrap(), vec!["DAPI", "CD45"]);
        assert_eq!(channel_names(Some(&path), 2).unwrap(), vec!["DAPI", "CD45"]);
        assert!(channel_names(Some(&path), 3).is_none());
    }

    #[test]
    fn headerless_file_uses_first_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("markers.csv");
        std::fs::write(&path, "\u{feff}DAPI,1\nCD3,1\n\nCD8,2\n").unwrap();
        assert_eq!(read_marker_names(&path).unwrap(), vec!["DAPI", "CD3", "CD8"]);
    }
}
