use regex::Regex;
use std::sync::OnceLock;

fn unreleased_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-([0-9]+)\) UNRELEASED").expect("changelog pattern is valid"))
}

/// Replace every `-N) UNRELEASED` release marker in a `debian/changelog`
/// with the distribution-specific marker `-N<codename>0) <codename>`.
pub fn substitute_unreleased(changelog: &str, codename: &str) -> String {
    unreleased_regex()
        .replace_all(changelog, |caps: &regex::Captures| {
            format!("-{}{}0) {}", &caps[1], codename, codename)
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_release_marker() {
        let input = "demo (1.0-1) UNRELEASED; urgency=low\n";
        let output = substitute_unreleased(input, "noble");
        assert_eq!(output, "demo (1.0-1noble0) noble; urgency=low\n");
    }

    #[test]
    fn leaves_already_released_entries_untouched() {
        let input = "demo (1.0-1noble0) noble; urgency=low\n";
        assert_eq!(substitute_unreleased(input, "noble"), input);
    }

    #[test]
    fn substitutes_every_occurrence() {
        let input = "a (1-2) UNRELEASED\nb (1-3) UNRELEASED\n";
        let output = substitute_unreleased(input, "bookworm");
        assert_eq!(output, "a (1-2bookworm0) bookworm\nb (1-3bookworm0) bookworm\n");
    }
}
