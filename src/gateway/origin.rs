/// Exact-match allow-list for the browser `Origin` header.
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    allowed: Vec<String>,
}

impl OriginPolicy {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = allowed
            .into_iter()
            .map(|origin| origin.as_ref().trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();
        Self { allowed }
    }

    /// A request without `Origin` did not come from a cross-site page and is
    /// allowed. Otherwise the value must equal one configured origin.
    pub fn permits(&self, origin: Option<&str>) -> bool {
        match origin {
            None => true,
            Some(origin) => self.allowed.iter().any(|allowed| allowed == origin),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_after_trimming_config() {
        let policy = OriginPolicy::new([" https://app.example.com ", "http://localhost:5173"]);
        assert!(policy.permits(Some("https://app.example.com")));
        assert!(policy.permits(Some("http://localhost:5173")));
        assert!(!policy.permits(Some("https://app.example.com.evil.net")));
        assert!(!policy.permits(Some("http://app.example.com")));
    }

    #[test]
    fn missing_origin_is_same_origin() {
        let policy = OriginPolicy::new(Vec::<String>::new());
        assert!(policy.permits(None));
        assert!(!policy.permits(Some("null")));
    }
}
