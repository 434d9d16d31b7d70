use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Литерал wildcard-подписки на все topic'и.
pub const WILDCARD: &str = "*";

// ════════════════════════════════════════════════════════════════
//  Topic Pattern
// ════════════════════════════════════════════════════════════════

/// Паттерн подписки: точное имя topic'а или wildcard.
///
/// На проводе это всегда строка; `*` означает "все topic'и".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TopicPattern {
    Exact(String),
    Wildcard,
}

impl TopicPattern {
    pub fn parse(s: &str) -> Self {
        if s == WILDCARD {
            TopicPattern::Wildcard
        } else {
            TopicPattern::Exact(s.to_string())
        }
    }

    /// Exact совпадает только по имени, wildcard с любым topic'ом.
    pub fn matches(&self, topic: &str) -> bool {
        match self {
            TopicPattern::Exact(name) => name == topic,
            TopicPattern::Wildcard => true,
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            TopicPattern::Exact(name) => name,
            TopicPattern::Wildcard => WILDCARD,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, TopicPattern::Wildcard)
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl From<&str> for TopicPattern {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl Serialize for TopicPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for TopicPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_every_topic() {
        let p = TopicPattern::parse("*");
        assert!(p.is_wildcard());
        assert!(p.matches("orders"));
        assert!(p.matches("shipping"));
        assert!(p.matches(""));
    }

    #[test]
    fn exact_matches_only_its_topic() {
        let p = TopicPattern::parse("orders");
        assert!(p.matches("orders"));
        assert!(!p.matches("shipping"));
        assert!(!p.matches("orders.eu"));
    }

    #[test]
    fn wire_form_is_plain_string() {
        let json = serde_json::to_string(&vec![TopicPattern::Wildcard, "orders".into()]).unwrap();
        assert_eq!(json, r#"["*","orders"]"#);
        let back: Vec<TopicPattern> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![TopicPattern::Wildcard, TopicPattern::Exact("orders".into())]);
    }
}
