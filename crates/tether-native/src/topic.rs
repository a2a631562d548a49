//! MQTT topic filter matching.

/// Whether `topic` matches `filter`, honouring the `+` (one level) and `#`
/// (remaining levels, including the parent) wildcards. Topics starting with
/// `$` are never matched by a wildcard in the first level.
pub fn matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return filter_levels.next().is_none(),
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        assert!(matches("devices/abc/state", "devices/abc/state"));
        assert!(!matches("devices/abc/state", "devices/abc"));
        assert!(!matches("devices/abc", "devices/abc/state"));
    }

    #[test]
    fn single_level_wildcard() {
        assert!(matches("devices/+/state", "devices/abc/state"));
        assert!(!matches("devices/+/state", "devices/abc/def/state"));
        assert!(matches("devices/+", "devices/"));
    }

    #[test]
    fn multi_level_wildcard() {
        assert!(matches("devices/#", "devices/abc/state"));
        assert!(matches("devices/#", "devices"));
        assert!(matches("#", "anything/at/all"));
        assert!(!matches("devices/#/state", "devices/abc/state"));
    }

    #[test]
    fn system_topics_skip_leading_wildcards() {
        assert!(!matches("#", "$aws/things/dev/jobs/notify"));
        assert!(!matches("+/things/dev/jobs/notify", "$aws/things/dev/jobs/notify"));
        assert!(matches("$aws/things/+/jobs/#", "$aws/things/dev/jobs/notify"));
    }
}
