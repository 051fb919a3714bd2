//! MQTT topic filter matching.

use super::Error;

const SEPARATOR: char = '/';
const SINGLE_LEVEL: &str = "+";
const MULTI_LEVEL: &str = "#";

/// Whether `topic` is matched by `filter`.
///
/// `+` matches exactly one level and `#` matches the remaining levels,
/// including none at all, so `a/#` matches `a`.
#[must_use]
pub fn matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split(SEPARATOR);
    let mut topic_levels = topic.split(SEPARATOR);

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some(MULTI_LEVEL), _) => return true,
            (Some(SINGLE_LEVEL), Some(_)) => {}
            (Some(expected), Some(level)) if expected == level => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Check a topic messages can be published to.
///
/// # Errors
///
/// Returns an error if the topic is empty or contains a wildcard.
pub fn validate_topic(topic: &str) -> Result<(), Error> {
    if topic.is_empty() {
        return Err(Error::EmptyTopic);
    }
    if topic.contains(['+', '#']) {
        return Err(Error::WildcardTopic(topic.to_string()));
    }
    Ok(())
}

/// Check a filter that can be subscribed to.
///
/// # Errors
///
/// Returns an error if the filter is empty or a wildcard is misplaced.
pub fn validate_filter(filter: &str) -> Result<(), Error> {
    if filter.is_empty() {
        return Err(Error::EmptyTopic);
    }

    let mut levels = filter.split(SEPARATOR).peekable();
    while let Some(level) = levels.next() {
        let valid = match level {
            MULTI_LEVEL => levels.peek().is_none(),
            SINGLE_LEVEL => true,
            other => !other.contains(['+', '#']),
        };
        if !valid {
            return Err(Error::InvalidFilter(filter.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(matches("ack/user", "ack/user"));
        assert!(!matches("ack/user", "ack/users"));
        assert!(!matches("ack/user", "ack/user/1"));
        assert!(!matches("ack/user/1", "ack/user"));
    }

    #[test]
    fn test_single_level_wildcard() {
        assert!(matches("ack/+/state", "ack/lamp/state"));
        assert!(matches("+", "ack"));
        assert!(!matches("ack/+", "ack/lamp/state"));
        assert!(!matches("ack/+/state", "ack/state"));
    }

    #[test]
    fn test_multi_level_wildcard() {
        assert!(matches("#", "ack/lamp/state"));
        assert!(matches("ack/#", "ack/lamp/state"));
        assert!(matches("ack/#", "ack"));
        assert!(!matches("ack/#", "cmd/lamp"));
    }

    #[test]
    fn test_validation() {
        assert_eq!(validate_topic(""), Err(Error::EmptyTopic));
        assert!(validate_topic("cmd/lamp").is_ok());
        assert_eq!(
            validate_topic("cmd/+"),
            Err(Error::WildcardTopic("cmd/+".to_string()))
        );

        assert!(validate_filter("ack/+/state").is_ok());
        assert!(validate_filter("ack/#").is_ok());
        assert_eq!(
            validate_filter("ack/#/state"),
            Err(Error::InvalidFilter("ack/#/state".to_string()))
        );
        assert_eq!(
            validate_filter("ack/lamp+"),
            Err(Error::InvalidFilter("ack/lamp+".to_string()))
        );
    }
}
