use std::path::{Path, PathBuf};

/// Parse a `.changes` file's `Files:` section. Each subsequent non-blank
/// line carries five whitespace-separated fields (checksum, size, section,
/// priority, filename); the filename is the fifth field, resolved relative
/// to `dir`.
pub fn parse_changes_files(changes_text: &str, dir: &Path) -> Vec<PathBuf> {
    let mut in_files_section = false;
    let mut files = Vec::new();
    for line in changes_text.lines() {
        if line.trim_end() == "Files:" {
            in_files_section = true;
            continue;
        }
        if !in_files_section {
            continue;
        }
        if line.trim().is_empty() {
            break;
        }
        if !line.starts_with(' ') && !line.starts_with('\t') {
            break;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if let Some(filename) = fields.get(4) {
            files.push(dir.join(filename));
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fifth_field_of_each_files_line() {
        let changes = "Format: 1.8\nFiles:\n abcdef 1234 devel optional demo_1.0_amd64.deb\n 123456 42 devel optional demo_1.0.dsc\n";
        let files = parse_changes_files(changes, Path::new("/incoming"));
        assert_eq!(
            files,
            vec![
                PathBuf::from("/incoming/demo_1.0_amd64.deb"),
                PathBuf::from("/incoming/demo_1.0.dsc"),
            ]
        );
    }

    #[test]
    fn stops_at_blank_line_after_files_section() {
        let changes = "Files:\n abcdef 1 devel optional demo_1.0.dsc\n\nDescription:\n demo - does things\n";
        let files = parse_changes_files(changes, Path::new("/incoming"));
        assert_eq!(files, vec![PathBuf::from("/incoming/demo_1.0.dsc")]);
    }

    #[test]
    fn no_files_section_yields_empty() {
        assert!(parse_changes_files("Format: 1.8\n", Path::new("/incoming")).is_empty());
    }
}
