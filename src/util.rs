//! Small helpers shared across modules.

/// Serialize a `Duration` as whole milliseconds.
///
/// ```
/// # use std::time::Duration;
/// #[derive(serde::Serialize, serde::Deserialize)]
/// struct Timed {
///     #[serde(with = "prdforge::util::duration_ms")]
///     elapsed: Duration,
/// }
/// let json = serde_json::to_string(&Timed { elapsed: Duration::from_millis(1500) }).unwrap();
/// assert_eq!(json, r#"{"elapsed":1500}"#);
/// ```
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Serialize a `Duration` as seconds; whole values stay integers.
///
/// Deserializes either an integer or a fractional number of seconds, so
/// `0.25` is a quarter second rather than zero.
pub mod duration_secs {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Secs {
        Whole(u64),
        Fractional(f64),
    }

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_u64(duration.as_secs())
        } else {
            serializer.serialize_f64(duration.as_secs_f64())
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Secs::deserialize(deserializer)? {
            Secs::Whole(secs) => Ok(Duration::from_secs(secs)),
            Secs::Fractional(secs) => Duration::try_from_secs_f64(secs).map_err(D::Error::custom),
        }
    }

    /// Parse a seconds string such as `"30"` or `"0.5"`.
    pub fn parse(value: &str) -> Option<Duration> {
        let secs: f64 = value.trim().parse().ok()?;
        Duration::try_from_secs_f64(secs).ok()
    }
}

/// Keep at most the last `max_lines` lines of process output.
pub fn tail_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_lines() {
        assert_eq!(tail_lines("a\nb\nc", 2), "b\nc");
        assert_eq!(tail_lines("a", 5), "a");
        assert_eq!(tail_lines("", 3), "");
    }

    #[test]
    fn test_duration_secs_keeps_fractions() {
        use std::time::Duration;

        #[derive(serde::Serialize, serde::Deserialize)]
        struct Limits {
            #[serde(with = "duration_secs")]
            timeout: Duration,
        }

        let whole: Limits = toml::from_str("timeout = 30").unwrap();
        assert_eq!(whole.timeout, Duration::from_secs(30));
        let half: Limits = toml::from_str("timeout = 0.5").unwrap();
        assert_eq!(half.timeout, Duration::from_millis(500));
        assert!(toml::from_str::<Limits>("timeout = -1").is_err());

        assert_eq!(toml::to_string(&whole).unwrap().trim(), "timeout = 30");
        assert_eq!(toml::to_string(&half).unwrap().trim(), "timeout = 0.5");

        assert_eq!(duration_secs::parse(" 0.25 "), Some(Duration::from_millis(250)));
        assert_eq!(duration_secs::parse("soon"), None);
    }
}
