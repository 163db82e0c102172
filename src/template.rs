use std::{collections::BTreeMap, sync::OnceLock};

use regex::{Captures, Regex};

pub type TemplateValues = BTreeMap<String, String>;

fn marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"%([A-Za-z_][A-Za-z0-9_]*)").expect("should never happen"))
}

/// Replaces every `%<name>` marker in `template` with the matching value.
/// A marker is the longest run of name characters after `%` and is looked
/// up whole, so `%channelName` never matches a `channel` value. Markers
/// without a value are left untouched, and substituted text is not expanded
/// again in the same pass.
pub fn expand(template: &str, values: &TemplateValues) -> String {
    marker()
        .replace_all(template, |caps: &Captures| match values.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Expands `template` with `local` first, then with `session`. A local value
/// may itself carry a marker that only the session pass resolves.
pub fn expand_two_pass(template: &str, local: &TemplateValues, session: &TemplateValues) -> String {
    expand(&expand(template, local), session)
}

/// Returns the markers still present in an expanded string.
pub fn unresolved_markers(expanded: &str) -> Vec<&str> {
    marker().find_iter(expanded).map(|m| m.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> TemplateValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn replaces_every_occurrence() {
        let result = expand(
            "/%channelName/streams?c=%channelName",
            &values(&[("channelName", "owl")]),
        );
        assert_eq!(result, "/owl/streams?c=owl");
    }

    #[test]
    fn markers_match_whole_names() {
        let v = values(&[("channel", "X"), ("channelName", "owl"), ("api", "nope")]);

        assert_eq!(
            expand("https://www.youtube.com/@%channelName/streams", &v),
            "https://www.youtube.com/@owl/streams"
        );
        assert_eq!(
            expand("/browse?key=%apiKey&c=%channel", &v),
            "/browse?key=%apiKey&c=X"
        );
    }

    #[test]
    fn leaves_unknown_markers() {
        let result = expand("/browse?key=%apiKey", &values(&[("channelName", "owl")]));
        assert_eq!(result, "/browse?key=%apiKey");
        assert_eq!(unresolved_markers(&result), vec!["%apiKey"]);
    }

    #[test]
    fn empty_values_is_noop() {
        let template = "https://www.youtube.com/@%channelName/streams";
        assert_eq!(expand(template, &TemplateValues::new()), template);
    }

    #[test]
    fn reapplying_is_idempotent() {
        let v = values(&[("apiKey", "KEY")]);
        let once = expand("/browse?key=%apiKey", &v);
        assert_eq!(expand(&once, &v), once);
        assert!(unresolved_markers(&once).is_empty());
    }

    #[test]
    fn local_pass_runs_before_session_pass() {
        let local = values(&[("path", "/browse?key=%apiKey")]);
        let session = values(&[("apiKey", "KEY")]);
        assert_eq!(expand_two_pass("%path", &local, &session), "/browse?key=KEY");

        // Reversed order leaves the injected marker behind.
        assert_eq!(expand_two_pass("%path", &session, &local), "/browse?key=%apiKey");
    }
}
